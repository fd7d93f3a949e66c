use super::scaling::scale;
use super::types::{Feature, ReducerKind, ScalerKind};
use crate::algorithms::umap::{Umap, UmapModel, UmapParams};
use crate::error::{KeyfiError, Result, ResultExt as _};
use crate::table::FieldTable;
use linfa::traits::Transformer as _;
use linfa_tsne::TSneParams;
use ndarray::{Array2, ArrayView2};
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Barnes-Hut t-SNE settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TsneParams {
    pub n_components: usize,
    pub perplexity: f64,
    /// Barnes-Hut angle; 0 computes exact gradients.
    pub approx_threshold: f64,
    pub max_iter: usize,
    pub random_state: Option<u64>,
}

impl Default for TsneParams {
    fn default() -> Self {
        Self {
            n_components: 2,
            perplexity: 30.0,
            approx_threshold: 0.5,
            max_iter: 1000,
            random_state: None,
        }
    }
}

/// Dimensionality reduction algorithm together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum Reducer {
    #[serde(rename = "UMAP", alias = "umap")]
    Umap(UmapParams),
    #[serde(rename = "TSNE", alias = "tsne")]
    Tsne(TsneParams),
}

impl Default for Reducer {
    fn default() -> Self {
        Self::Umap(UmapParams::default())
    }
}

impl Reducer {
    /// Builds a reducer from an algorithm name and a JSON object of
    /// parameters. Unknown names fail before the parameters are looked at.
    pub fn from_parts(kind: &str, params: serde_json::Value) -> Result<Self> {
        let kind: ReducerKind = kind.parse()?;
        let params = if params.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            params
        };
        Ok(match kind {
            ReducerKind::Umap => Self::Umap(serde_json::from_value(params)?),
            ReducerKind::Tsne => Self::Tsne(serde_json::from_value(params)?),
        })
    }

    pub fn kind(&self) -> ReducerKind {
        match self {
            Self::Umap(_) => ReducerKind::Umap,
            Self::Tsne(_) => ReducerKind::Tsne,
        }
    }

    /// Target dimensionality.
    pub fn n_components(&self) -> usize {
        match self {
            Self::Umap(p) => p.n_components,
            Self::Tsne(p) => p.n_components,
        }
    }

    /// UMAP is fitted, then the same data is transformed through the model,
    /// which is returned. t-SNE fits and transforms in one call and returns no
    /// model. Provider errors pass through unchanged.
    pub fn fit_or_fit_transform(
        &self,
        data: ArrayView2<'_, f64>,
    ) -> Result<(Array2<f64>, Option<UmapModel>)> {
        match self {
            Self::Umap(params) => {
                let model = Umap::new(params.clone())
                    .fit(data)
                    .map_err(KeyfiError::upstream)?;
                let embedding = model.transform(data).map_err(KeyfiError::upstream)?;
                Ok((embedding, Some(model)))
            }
            Self::Tsne(params) => {
                let rng = match params.random_state {
                    Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                    None => ChaCha8Rng::from_entropy(),
                };
                let embedding = TSneParams::embedding_size_with_rng(params.n_components, rng)
                    .perplexity(params.perplexity)
                    .approx_threshold(params.approx_threshold)
                    .max_iter(params.max_iter)
                    .transform(data.to_owned())
                    .map_err(KeyfiError::upstream)?;
                Ok((embedding, None))
            }
        }
    }
}

/// Pre-processing applied before reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbedOptions {
    pub scale: bool,
    pub scaler: ScalerKind,
    pub feature: Feature,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            scale: true,
            scaler: ScalerKind::Standard,
            feature: Feature::All,
        }
    }
}

/// Low-dimensional coordinates, one row per table row.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    coords: Array2<f64>,
}

impl Embedding {
    pub fn new(coords: Array2<f64>) -> Self {
        Self { coords }
    }

    pub fn coords(&self) -> &Array2<f64> {
        &self.coords
    }

    pub fn into_coords(self) -> Array2<f64> {
        self.coords
    }

    pub fn n_samples(&self) -> usize {
        self.coords.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.coords.ncols()
    }

    /// `<dir>/<name>.txt`.
    pub fn dump_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.txt"))
    }

    /// Writes one whitespace-separated row per sample.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = String::with_capacity(self.coords.len() * 26);
        for row in self.coords.rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{v:.18e}")).collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        std::fs::write(path, out)
            .with_context(|| format!("Failed to write embedding {}", path.display()))?;
        tracing::info!("Embedding data saved to {}", path.display());
        Ok(())
    }

    /// Reads a dump written by [`Embedding::save`] (or any whitespace-delimited
    /// numeric text with a constant column count).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read embedding {}", path.display()))?;
        let mut values = Vec::new();
        let mut width: Option<usize> = None;
        let mut rows = 0;
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row: Vec<f64> = line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| {
                    KeyfiError::DataProcessing(format!(
                        "{}:{}: {e}",
                        path.display(),
                        lineno + 1
                    ))
                })?;
            match width {
                None => width = Some(row.len()),
                Some(w) if w != row.len() => {
                    return Err(KeyfiError::DataProcessing(format!(
                        "{}:{}: expected {w} columns, found {}",
                        path.display(),
                        lineno + 1,
                        row.len()
                    )));
                }
                Some(_) => {}
            }
            values.extend(row);
            rows += 1;
        }
        let coords = Array2::from_shape_vec((rows, width.unwrap_or(0)), values)?;
        tracing::info!("Embedding data read from {}", path.display());
        Ok(Self { coords })
    }

    pub fn save_named(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = Self::dump_path(dir, name);
        self.save(&path)?;
        Ok(path)
    }

    pub fn load_named(dir: &Path, name: &str) -> Result<Self> {
        Self::load(&Self::dump_path(dir, name))
    }
}

/// Optionally scales `table`, then reduces it with `reducer`.
///
/// Returns the embedding and, for UMAP, the fitted model.
pub fn embed(
    table: &FieldTable,
    reducer: &Reducer,
    options: &EmbedOptions,
) -> Result<(Embedding, Option<UmapModel>)> {
    if options.scale
        && let Feature::Column(name) = &options.feature
    {
        table.require_columns(&[name])?;
    }

    let matrix = if options.scale {
        scale(table, options.scaler, &options.feature)?.into_matrix()?
    } else {
        table.to_matrix()?
    };

    tracing::info!(
        "Data reduction using algorithm: {} on {} x {}",
        reducer.kind(),
        matrix.nrows(),
        matrix.ncols()
    );
    let start = Instant::now();
    let (coords, model) = reducer.fit_or_fit_transform(matrix.view())?;
    tracing::info!(
        "{} finished in {} ms",
        reducer.kind(),
        start.elapsed().as_millis()
    );

    Ok((Embedding::new(coords), model))
}
