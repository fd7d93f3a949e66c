//! Run specification data structures.
//!
//! A run specification names the input, the cleaning rules, the embedding
//! and clustering algorithms with their parameters, and what to write or show
//! afterwards. Algorithm parameters stay as raw JSON until [`PipelineSpec::resolve`]
//! hands them to the chosen algorithm, so an unknown algorithm name is reported
//! as such rather than as a parse failure.

use crate::dimred::{CleanOptions, Clusterer, ClustererKind, Feature, Reducer, ReducerKind, ScalerKind};
use crate::error::{KeyfiError, Result, ResultExt as _};
use crate::mesh::FlattenOptions;
use crate::plot::RenderConfig;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current run specification version
pub const SPEC_VERSION: &str = "0.1";

/// Root run specification structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Specification version for future migrations
    pub version: String,

    /// Human-readable run name
    pub name: String,

    pub input: InputConfig,

    #[serde(default)]
    pub cleaning: CleanOptions,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Mesh written back with a `clusters` array
    #[serde(default)]
    pub output: Option<OutputConfig>,

    #[serde(default)]
    pub plots: Vec<PlotRequest>,

    /// Replaces the application render settings for this run
    #[serde(default)]
    pub render: Option<RenderConfig>,
}

/// Input file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Mesh file read through the mesh I/O provider
    #[default]
    Mesh,
    /// Headered CSV of numeric columns
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub format: InputFormat,

    /// Ghost filtering and excluded arrays, mesh input only
    #[serde(default)]
    pub flatten: FlattenOptions,
}

/// Name plus raw parameters of an algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub algorithm: String,

    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Scale before reducing
    #[serde(default = "default_true")]
    pub scale: bool,

    #[serde(default)]
    pub scaler: ScalerKind,

    /// `"All"` or a single column name
    #[serde(default)]
    pub feature: Feature,

    #[serde(flatten)]
    pub reducer: AlgorithmConfig,

    /// Embedding dump location
    #[serde(default)]
    pub dump: Option<DumpConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            scale: true,
            scaler: ScalerKind::default(),
            feature: Feature::default(),
            reducer: AlgorithmConfig {
                algorithm: ReducerKind::Umap.to_string(),
                params: empty_params(),
            },
            dump: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpConfig {
    pub dir: PathBuf,
    pub name: String,

    /// Load the dump instead of recomputing when it exists
    #[serde(default)]
    pub reuse: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    #[serde(flatten)]
    pub clusterer: AlgorithmConfig,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            clusterer: AlgorithmConfig {
                algorithm: ClustererKind::Hdbscan.to_string(),
                params: empty_params(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output path template (supports {date} substitution)
    pub path_template: String,
}

impl OutputConfig {
    pub fn path(&self) -> PathBuf {
        expand_path_template(&self.path_template)
    }
}

/// Which view to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum PlotView {
    Embedding {
        #[serde(default)]
        color_by: Option<String>,
        /// Colormap bounds, exactly two values
        #[serde(default)]
        range: Option<Vec<f64>>,
    },
    Clustering,
    Membership {
        #[serde(default = "default_true")]
        soft: bool,
        #[serde(default = "default_true")]
        legend: bool,
    },
    CondensedTree,
    Model {
        /// Color the model layout by cluster label
        #[serde(default)]
        labels: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRequest {
    #[serde(flatten)]
    pub view: PlotView,

    /// PNG path template (supports {date}); shown interactively when absent
    #[serde(default)]
    pub save: Option<String>,
}

impl PlotRequest {
    pub fn save_path(&self) -> Option<PathBuf> {
        self.save.as_deref().map(expand_path_template)
    }
}

/// Algorithms selected by a validated specification.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAlgorithms {
    pub reducer: Reducer,
    pub clusterer: Clusterer,
}

impl PipelineSpec {
    pub fn new(name: impl Into<String>, input: impl Into<PathBuf>) -> Self {
        Self {
            version: SPEC_VERSION.to_owned(),
            name: name.into(),
            input: InputConfig {
                path: input.into(),
                format: InputFormat::default(),
                flatten: FlattenOptions::default(),
            },
            cleaning: CleanOptions::default(),
            embedding: EmbeddingConfig::default(),
            clustering: ClusteringConfig::default(),
            output: None,
            plots: Vec::new(),
            render: None,
        }
    }

    /// Load a run specification from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run specification {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse a run specification from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| KeyfiError::Config(format!("Failed to parse run specification: {e}")))
    }

    /// Save the run specification to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run specification {}", path.display()))
    }

    /// Serialize the run specification to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses the algorithm names and parameters.
    pub fn resolve(&self) -> Result<ResolvedAlgorithms> {
        let reducer = Reducer::from_parts(
            &self.embedding.reducer.algorithm,
            self.embedding.reducer.params.clone(),
        )?;
        let clusterer = Clusterer::from_parts(
            &self.clustering.clusterer.algorithm,
            self.clustering.clusterer.params.clone(),
        )?;
        Ok(ResolvedAlgorithms { reducer, clusterer })
    }

    /// Every check that needs no data: version, algorithm names and
    /// parameters, cleaning options, plot arguments and their compatibility
    /// with the chosen algorithms.
    pub fn validate(&self) -> Result<ResolvedAlgorithms> {
        if self.version != SPEC_VERSION {
            return Err(KeyfiError::Config(format!(
                "Unsupported spec version '{}', expected '{SPEC_VERSION}'",
                self.version
            )));
        }
        let resolved = self.resolve()?;
        self.cleaning.validate()?;

        if self.output.is_some() && self.input.format != InputFormat::Mesh {
            return Err(KeyfiError::invalid_argument(
                "cluster labels can only be written back to a mesh input",
            ));
        }
        for plot in &self.plots {
            self.validate_plot(plot, &resolved)?;
        }
        Ok(resolved)
    }

    fn validate_plot(&self, plot: &PlotRequest, resolved: &ResolvedAlgorithms) -> Result<()> {
        match &plot.view {
            PlotView::Embedding { range, .. } => {
                if let Some(range) = range
                    && range.len() != 2
                {
                    return Err(KeyfiError::invalid_argument(format!(
                        "color range needs exactly 2 values, got {}",
                        range.len()
                    )));
                }
            }
            PlotView::Clustering => {}
            PlotView::Membership { soft, .. } => {
                if *soft {
                    match &resolved.clusterer {
                        Clusterer::Hdbscan(p) if p.prediction_data => {}
                        _ => {
                            return Err(KeyfiError::invalid_argument(
                                "soft membership needs HDBSCAN with prediction_data enabled",
                            ));
                        }
                    }
                }
            }
            PlotView::CondensedTree => {
                if resolved.clusterer.kind() != ClustererKind::Hdbscan {
                    return Err(KeyfiError::invalid_argument(
                        "the condensed tree is only available for HDBSCAN",
                    ));
                }
            }
            PlotView::Model { .. } => {
                if resolved.reducer.kind() != ReducerKind::Umap {
                    return Err(KeyfiError::invalid_argument(
                        "the model view is only available for UMAP",
                    ));
                }
                if self.embedding.dump.as_ref().is_some_and(|d| d.reuse) {
                    return Err(KeyfiError::invalid_argument(
                        "the model view needs a fitted model, disable embedding.dump.reuse",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Expand path template with variables (e.g., {date})
pub fn expand_path_template(template: &str) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    PathBuf::from(template.replace("{date}", &today))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "version": "0.1",
            "name": "jet",
            "input": { "path": "case.json" },
            "cleaning": { "dim": 2, "vars_to_drop": ["T"] },
            "embedding": {
                "algorithm": "UMAP",
                "params": { "n_neighbors": 30, "min_dist": 0.0, "random_state": 42 },
                "scaler": "MinMaxScaler"
            },
            "clustering": {
                "algorithm": "HDBSCAN",
                "params": { "min_cluster_size": 50, "prediction_data": true }
            },
            "output": { "path_template": "out/{date}.json" },
            "plots": [
                { "view": "clustering", "save": "figs/clusters.png" },
                { "view": "membership" },
                { "view": "embedding", "color_by": "P", "range": [0, 5] }
            ]
        }"#
    }

    #[test]
    fn test_spec_parses_and_validates() -> Result<()> {
        let spec = PipelineSpec::from_json(sample_json())?;
        assert_eq!(spec.name, "jet");
        assert_eq!(spec.input.format, InputFormat::Mesh);
        assert_eq!(spec.embedding.scaler, ScalerKind::MinMax);
        assert!(spec.embedding.scale);
        assert_eq!(spec.plots.len(), 3);
        let resolved = spec.validate()?;
        assert_eq!(resolved.reducer.kind(), ReducerKind::Umap);
        assert_eq!(resolved.clusterer.kind(), ClustererKind::Hdbscan);
        Ok(())
    }

    #[test]
    fn test_spec_round_trip() -> Result<()> {
        let spec = PipelineSpec::from_json(sample_json())?;
        let again = PipelineSpec::from_json(&spec.to_json()?)?;
        assert_eq!(spec, again);
        Ok(())
    }

    #[test]
    fn test_unknown_algorithm_is_invalid_argument() -> Result<()> {
        let mut spec = PipelineSpec::new("x", "in.json");
        spec.embedding.reducer.algorithm = "PCA".to_owned();
        assert!(spec.validate().is_err_and(|e| e.is_invalid_argument()));

        let mut spec = PipelineSpec::new("x", "in.json");
        spec.clustering.clusterer.algorithm = "Birch".to_owned();
        assert!(spec.validate().is_err_and(|e| e.is_invalid_argument()));
        Ok(())
    }

    #[test]
    fn test_bad_plot_arguments_rejected() -> Result<()> {
        let mut spec = PipelineSpec::new("x", "in.json");
        spec.plots.push(PlotRequest {
            view: PlotView::Embedding {
                color_by: Some("P".to_owned()),
                range: Some(vec![1.0]),
            },
            save: None,
        });
        assert!(spec.validate().is_err());

        let mut spec = PipelineSpec::new("x", "in.json");
        spec.clustering.clusterer = AlgorithmConfig {
            algorithm: "KMeans".to_owned(),
            params: serde_json::json!({ "n_clusters": 3 }),
        };
        spec.plots.push(PlotRequest {
            view: PlotView::CondensedTree,
            save: None,
        });
        assert!(spec.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_invalid_dim_and_version() -> Result<()> {
        let mut spec = PipelineSpec::new("x", "in.json");
        spec.cleaning.dim = 4;
        assert!(spec.validate().is_err_and(|e| e.is_invalid_argument()));

        let mut spec = PipelineSpec::new("x", "in.json");
        spec.version = "9".to_owned();
        assert!(spec.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_path_template_expands_date() {
        let path = expand_path_template("out/{date}/mesh.json");
        let today = Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(path, PathBuf::from(format!("out/{today}/mesh.json")));
    }
}
