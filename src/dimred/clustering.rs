use super::embedding::Embedding;
use super::types::ClustererKind;
use crate::algorithms::hdbscan::{CondensedTree, Hdbscan, HdbscanParams};
use crate::error::{KeyfiError, Result};
use linfa::DatasetBase;
use linfa::traits::{Fit as _, Predict as _};
use linfa_clustering::{KMeans, KMeansInit};
use ndarray::Array2;
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

/// Centroid seeding strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KMeansInitMethod {
    #[default]
    #[serde(rename = "k-means++")]
    KMeansPlusPlus,
    #[serde(rename = "random")]
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub max_iter: u64,
    /// Independent restarts; the lowest inertia wins.
    pub n_init: usize,
    pub tolerance: f64,
    pub init: KMeansInitMethod,
    pub random_state: Option<u64>,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            max_iter: 300,
            n_init: 10,
            tolerance: 1e-4,
            init: KMeansInitMethod::KMeansPlusPlus,
            random_state: None,
        }
    }
}

/// Clustering algorithm together with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum Clusterer {
    #[serde(rename = "HDBSCAN", alias = "hdbscan")]
    Hdbscan(HdbscanParams),
    #[serde(rename = "KMeans", alias = "kmeans")]
    KMeans(KMeansParams),
}

impl Default for Clusterer {
    fn default() -> Self {
        Self::Hdbscan(HdbscanParams::default())
    }
}

impl Clusterer {
    /// Builds a clusterer from an algorithm name and a JSON object of
    /// parameters. Unknown names fail before the parameters are looked at.
    pub fn from_parts(kind: &str, params: serde_json::Value) -> Result<Self> {
        let kind: ClustererKind = kind.parse()?;
        let params = if params.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            params
        };
        Ok(match kind {
            ClustererKind::Hdbscan => Self::Hdbscan(serde_json::from_value(params)?),
            ClustererKind::KMeans => Self::KMeans(serde_json::from_value(params)?),
        })
    }

    pub fn kind(&self) -> ClustererKind {
        match self {
            Self::Hdbscan(_) => ClustererKind::Hdbscan,
            Self::KMeans(_) => ClustererKind::KMeans,
        }
    }

    /// Single blocking fit. Provider errors pass through unchanged.
    pub fn fit(&self, data: &Array2<f64>) -> Result<ClusterResult> {
        match self {
            Self::Hdbscan(params) => {
                let fit = Hdbscan::new(params.clone())
                    .fit(data.view())
                    .map_err(KeyfiError::upstream)?;
                Ok(ClusterResult {
                    labels: fit.labels,
                    probabilities: fit.probabilities,
                    membership: fit.membership,
                    condensed_tree: Some(fit.tree),
                    centroids: None,
                })
            }
            Self::KMeans(params) => {
                let rng = match params.random_state {
                    Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                    None => ChaCha8Rng::from_entropy(),
                };
                let init = match params.init {
                    KMeansInitMethod::KMeansPlusPlus => KMeansInit::KMeansPlusPlus,
                    KMeansInitMethod::Random => KMeansInit::Random,
                };
                let dataset = DatasetBase::from(data.clone());
                let model = KMeans::params_with_rng(params.n_clusters, rng)
                    .max_n_iterations(params.max_iter)
                    .n_runs(params.n_init)
                    .tolerance(params.tolerance)
                    .init_method(init)
                    .fit(&dataset)
                    .map_err(KeyfiError::upstream)?;
                let assigned = model.predict(data);
                let labels = assigned
                    .iter()
                    .map(|&l| {
                        i32::try_from(l).map_err(|_| {
                            KeyfiError::DataProcessing(format!("cluster index {l} out of range"))
                        })
                    })
                    .collect::<Result<Vec<i32>>>()?;
                Ok(ClusterResult {
                    probabilities: vec![1.0; labels.len()],
                    labels,
                    membership: None,
                    condensed_tree: None,
                    centroids: Some(model.centroids().clone()),
                })
            }
        }
    }
}

/// Uniform view over both clustering families. Optional parts are present
/// only when the algorithm produces them.
#[derive(Debug, Clone)]
pub struct ClusterResult {
    labels: Vec<i32>,
    probabilities: Vec<f64>,
    membership: Option<Array2<f64>>,
    condensed_tree: Option<CondensedTree>,
    centroids: Option<Array2<f64>>,
}

impl ClusterResult {
    /// Assembles a result from precomputed parts.
    pub fn from_parts(
        labels: Vec<i32>,
        probabilities: Vec<f64>,
        membership: Option<Array2<f64>>,
    ) -> Result<Self> {
        if labels.len() != probabilities.len() {
            return Err(KeyfiError::invalid_argument(format!(
                "{} labels but {} probabilities",
                labels.len(),
                probabilities.len()
            )));
        }
        if let Some(m) = &membership
            && m.nrows() != labels.len()
        {
            return Err(KeyfiError::invalid_argument(format!(
                "membership matrix has {} rows for {} labels",
                m.nrows(),
                labels.len()
            )));
        }
        Ok(Self {
            labels,
            probabilities,
            membership,
            condensed_tree: None,
            centroids: None,
        })
    }

    /// Hard label per sample; `-1` is noise.
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// Confidence of each sample in its own label, in `[0, 1]`.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn soft_membership(&self) -> Option<&Array2<f64>> {
        self.membership.as_ref()
    }

    pub fn condensed_tree(&self) -> Option<&CondensedTree> {
        self.condensed_tree.as_ref()
    }

    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    /// Distinct non-negative labels.
    pub fn n_clusters(&self) -> usize {
        self.labels
            .iter()
            .filter(|&&l| l >= 0)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn has_noise(&self) -> bool {
        self.labels.contains(&-1)
    }
}

/// Clusters the embedding coordinates.
pub fn cluster(embedding: &Embedding, clusterer: &Clusterer) -> Result<ClusterResult> {
    tracing::info!(
        "Clustering {} points with {}",
        embedding.n_samples(),
        clusterer.kind()
    );
    let start = Instant::now();
    let result = clusterer.fit(embedding.coords())?;
    tracing::info!(
        "{} found {} clusters{} in {} ms",
        clusterer.kind(),
        result.n_clusters(),
        if result.has_noise() { " plus noise" } else { "" },
        start.elapsed().as_millis()
    );
    Ok(result)
}
