//! Backend-neutral figures and the view builders that produce them.

use super::DataShapeWarning;
use super::colors::{DEFAULT_COLOR, NOISE_COLOR, colorize, inferno, label_color, palette};
use super::style::RenderConfig;
use crate::algorithms::hdbscan::CondensedTree;
use crate::algorithms::umap::UmapModel;
use crate::dimred::{ClusterResult, Embedding};
use crate::error::{KeyfiError, Result};
use crate::table::FieldTable;
use egui::Color32;
use ndarray::Array2;
use std::collections::{BTreeMap, BTreeSet};

/// Scatter markers with per-point colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Scatter {
    pub points: Vec<[f64; 2]>,
    pub colors: Vec<Color32>,
    /// Marker area in points².
    pub area: f64,
    pub alpha: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilledRect {
    pub min: [f64; 2],
    pub max: [f64; 2],
    pub color: Color32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color32,
}

/// Color key drawn beside the plot area.
#[derive(Debug, Clone, PartialEq)]
pub enum Guide {
    None,
    Legend {
        title: String,
        entries: Vec<LegendEntry>,
    },
    Colorbar {
        label: String,
        min: f64,
        max: f64,
        /// Evenly spaced stops from `min` to `max`.
        stops: Vec<Color32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub title: String,
    pub scatter: Option<Scatter>,
    pub rects: Vec<FilledRect>,
    pub guide: Guide,
    pub equal_aspect: bool,
    pub show_axes: bool,
}

impl Figure {
    fn scatter(title: impl Into<String>, scatter: Scatter, guide: Guide) -> Self {
        Self {
            title: title.into(),
            scatter: Some(scatter),
            rects: Vec::new(),
            guide,
            equal_aspect: true,
            show_axes: false,
        }
    }

    /// `(min, max)` over every drawn element, `None` when empty.
    pub fn data_bounds(&self) -> Option<([f64; 2], [f64; 2])> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        if let Some(s) = &self.scatter {
            for p in &s.points {
                xs.push(p[0]);
                ys.push(p[1]);
            }
        }
        for r in &self.rects {
            xs.extend([r.min[0], r.max[0]]);
            ys.extend([r.min[1], r.max[1]]);
        }
        let finite = |v: &f64| v.is_finite();
        let min_x = xs.iter().copied().filter(finite).reduce(f64::min)?;
        let max_x = xs.iter().copied().filter(finite).reduce(f64::max)?;
        let min_y = ys.iter().copied().filter(finite).reduce(f64::min)?;
        let max_y = ys.iter().copied().filter(finite).reduce(f64::max)?;
        Some(([min_x, min_y], [max_x, max_y]))
    }
}

#[expect(clippy::indexing_slicing)]
fn planar_points(coords: &Array2<f64>) -> Result<Vec<[f64; 2]>> {
    if coords.ncols() < 2 {
        return Err(KeyfiError::invalid_argument(format!(
            "a scatter plot needs at least 2 embedding columns, got {}",
            coords.ncols()
        )));
    }
    Ok(coords.rows().into_iter().map(|r| [r[0], r[1]]).collect())
}

fn check_rows(what: &str, got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(KeyfiError::invalid_argument(format!(
            "{what} has {got} rows but the embedding has {expected}"
        )))
    }
}

/// Distinct labels in ascending order, noise first.
fn unique_labels(labels: &[i32]) -> Vec<i32> {
    labels.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

fn n_clusters(labels: &[i32]) -> usize {
    unique_labels(labels).iter().filter(|&&l| l >= 0).count()
}

fn legend(labels: &[i32], palette: &[Color32]) -> Guide {
    Guide::Legend {
        title: "Clusters".to_owned(),
        entries: unique_labels(labels)
            .into_iter()
            .map(|l| LegendEntry {
                label: l.to_string(),
                color: label_color(l, palette),
            })
            .collect(),
    }
}

fn cluster_count_warning(n_clusters: usize, config: &RenderConfig) -> Option<DataShapeWarning> {
    (n_clusters > config.warn_clusters).then(|| {
        let warning = DataShapeWarning::new(
            n_clusters,
            format!(
                "Number of clusters ({n_clusters}) too large, clustering visualization will be poor"
            ),
        );
        tracing::warn!("{warning}");
        warning
    })
}

/// Plain embedding scatter, optionally colored by one column of `data`
/// through the inferno colormap.
///
/// `range` pins the colormap bounds and must hold exactly two values.
pub fn embedding_view(
    embedding: &Embedding,
    data: Option<&FieldTable>,
    color_by: Option<&str>,
    range: Option<&[f64]>,
    config: &RenderConfig,
) -> Result<Figure> {
    if let Some(name) = color_by {
        match data {
            Some(table) if table.contains(name) => {}
            Some(table) => {
                return Err(KeyfiError::invalid_argument(format!(
                    "invalid variable '{name}' for the color map, expected one of: {}",
                    table.column_names().join(", ")
                )));
            }
            None => {
                return Err(KeyfiError::invalid_argument(format!(
                    "no data supplied to color by '{name}'"
                )));
            }
        }
    }
    if let Some(range) = range
        && range.len() != 2
    {
        return Err(KeyfiError::invalid_argument(format!(
            "color range needs exactly 2 values, got {}",
            range.len()
        )));
    }

    let points = planar_points(embedding.coords())?;
    let n = points.len();
    let (colors, guide) = match (color_by, data) {
        (Some(name), Some(table)) => {
            check_rows("color data", table.n_rows(), n)?;
            let values = table.values(name)?;
            let (lo, hi) = match range {
                Some(&[lo, hi]) => (lo, hi),
                _ => {
                    let finite = values.iter().copied().filter(|v| v.is_finite());
                    let lo = finite.clone().fold(f64::INFINITY, f64::min);
                    let hi = finite.fold(f64::NEG_INFINITY, f64::max);
                    if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) }
                }
            };
            let span = if hi > lo { hi - lo } else { 1.0 };
            let colors = values.iter().map(|v| inferno((v - lo) / span)).collect();
            let stops = (0..10).map(|i| inferno(f64::from(i) / 9.0)).collect();
            (
                colors,
                Guide::Colorbar {
                    label: name.to_owned(),
                    min: lo,
                    max: hi,
                    stops,
                },
            )
        }
        _ => (vec![DEFAULT_COLOR; n], Guide::None),
    };

    Ok(Figure::scatter(
        "Embedding",
        Scatter {
            points,
            colors,
            area: config.point_area(n),
            alpha: 1.0,
        },
        guide,
    ))
}

/// Scatter colored by hard label. Switches to a colorbar above
/// `legend_max_clusters` and warns above `warn_clusters`.
pub fn clustering_view(
    embedding: &Embedding,
    labels: &[i32],
    config: &RenderConfig,
) -> Result<(Figure, Option<DataShapeWarning>)> {
    let points = planar_points(embedding.coords())?;
    check_rows("labels", labels.len(), points.len())?;

    let k = n_clusters(labels);
    let warning = cluster_count_warning(k, config);
    let palette = palette(k);
    let colors = labels.iter().map(|&l| label_color(l, &palette)).collect();

    let guide = if k <= config.legend_max_clusters {
        legend(labels, &palette)
    } else {
        Guide::Colorbar {
            label: "Clusters".to_owned(),
            min: 0.0,
            max: k.saturating_sub(1) as f64,
            stops: palette,
        }
    };

    let area = config.point_area(points.len());
    let figure = Figure::scatter(
        "Clustering",
        Scatter {
            points,
            colors,
            area,
            alpha: 1.0,
        },
        guide,
    );
    Ok((figure, warning))
}

/// Scatter colored by cluster membership confidence.
pub fn membership_view(
    embedding: &Embedding,
    clusters: &ClusterResult,
    soft: bool,
    show_legend: bool,
    config: &RenderConfig,
) -> Result<Figure> {
    let points = planar_points(embedding.coords())?;
    check_rows("cluster labels", clusters.n_samples(), points.len())?;
    let member = colorize(clusters, soft)?;

    let guide = if show_legend {
        Guide::Legend {
            title: "Clusters".to_owned(),
            entries: unique_labels(clusters.labels())
                .into_iter()
                .zip(member.legend_colors())
                .map(|(l, color)| LegendEntry {
                    label: l.to_string(),
                    color,
                })
                .collect(),
        }
    } else {
        Guide::None
    };

    let area = config.membership_area(points.len());
    Ok(Figure::scatter(
        "Cluster membership",
        Scatter {
            points,
            colors: member.colors,
            area,
            alpha: config.membership_alpha,
        },
        guide,
    ))
}

/// Icicle drawing of the condensed cluster hierarchy.
///
/// Each branch spans its share of its parent's width from its birth down to
/// its death, with `lambda` growing downwards. Selected clusters take their
/// palette color, the rest are gray.
pub fn condensed_tree_view(tree: &CondensedTree, config: &RenderConfig) -> Result<Figure> {
    let branches = tree.branches();
    let n_selected = branches.iter().filter(|b| b.label.is_some()).count();
    let palette = palette(n_selected);

    let max_lambda = branches
        .iter()
        .map(|b| b.death)
        .filter(|l| l.is_finite())
        .fold(0.0_f64, f64::max);
    let sizes: BTreeMap<usize, usize> = branches.iter().map(|b| (b.id, b.size.max(1))).collect();

    // Branches come parents first, so a parent's span is always known.
    let mut spans: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
    let mut cursor: BTreeMap<usize, f64> = BTreeMap::new();
    let mut rects = Vec::with_capacity(branches.len());
    for branch in &branches {
        let parent_span = branch
            .parent
            .and_then(|p| spans.get(&p).map(|&span| (p, span)));
        let (x0, width) = match parent_span {
            Some((parent, (px0, pwidth))) => {
                let parent_size = sizes.get(&parent).copied().unwrap_or(1) as f64;
                let width = pwidth * branch.size as f64 / parent_size;
                let offset = cursor.entry(parent).or_insert(px0);
                let x0 = *offset;
                *offset += width;
                (x0, width)
            }
            None => (0.0, tree.n_samples().max(1) as f64),
        };
        spans.insert(branch.id, (x0, width));

        let death = if branch.death.is_finite() {
            branch.death
        } else {
            max_lambda
        };
        let color = branch
            .label
            .and_then(|l| usize::try_from(l).ok())
            .and_then(|i| palette.get(i).copied())
            .unwrap_or(NOISE_COLOR);
        rects.push(FilledRect {
            min: [x0, -death],
            max: [x0 + width, -branch.birth],
            color,
        });
    }

    let guide = if n_selected == 0 {
        Guide::None
    } else if n_selected <= config.legend_max_clusters {
        Guide::Legend {
            title: "Selected clusters".to_owned(),
            entries: palette
                .iter()
                .enumerate()
                .map(|(i, &color)| LegendEntry {
                    label: i.to_string(),
                    color,
                })
                .collect(),
        }
    } else {
        Guide::Colorbar {
            label: "Selected clusters".to_owned(),
            min: 0.0,
            max: (n_selected - 1) as f64,
            stops: palette,
        }
    };

    Ok(Figure {
        title: "Condensed tree".to_owned(),
        scatter: None,
        rects,
        guide,
        equal_aspect: false,
        show_axes: true,
    })
}

/// The training layout of a fitted UMAP model, colored by `labels` when given.
pub fn model_view(
    model: &UmapModel,
    labels: Option<&[i32]>,
    config: &RenderConfig,
) -> Result<(Figure, Option<DataShapeWarning>)> {
    let embedding = Embedding::new(model.embedding().clone());
    let (mut figure, warning) = match labels {
        Some(labels) => clustering_view(&embedding, labels, config)?,
        None => (embedding_view(&embedding, None, None, None, config)?, None),
    };
    figure.title = "UMAP".to_owned();
    Ok((figure, warning))
}
