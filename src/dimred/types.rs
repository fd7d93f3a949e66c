use crate::error::{KeyfiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-column rescaling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum ScalerKind {
    /// Zero mean, unit (population) variance.
    #[default]
    Standard,
    /// Minimum to 0, maximum to 1.
    MinMax,
    /// Divide by the largest absolute value.
    MaxAbs,
}

impl ScalerKind {
    pub const ALL: [Self; 3] = [Self::Standard, Self::MinMax, Self::MaxAbs];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "StandardScaler",
            Self::MinMax => "MinMaxScaler",
            Self::MaxAbs => "MaxAbsScaler",
        }
    }
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ScalerKind {
    type Error = KeyfiError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ScalerKind> for String {
    fn from(kind: ScalerKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl FromStr for ScalerKind {
    type Err = KeyfiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "standard" | "standardscaler" => Ok(Self::Standard),
            "minmax" | "minmaxscaler" => Ok(Self::MinMax),
            "maxabs" | "maxabsscaler" => Ok(Self::MaxAbs),
            _ => Err(KeyfiError::invalid_argument(format!(
                "unknown scaler '{s}', expected one of: StandardScaler, MinMaxScaler, MaxAbsScaler"
            ))),
        }
    }
}

/// Which columns a scaler applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Feature {
    /// Every column; the result is a plain matrix.
    #[default]
    All,
    /// One named column; the result keeps the table.
    Column(String),
}

impl Feature {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }
}

impl From<String> for Feature {
    fn from(s: String) -> Self {
        if s == "All" {
            Self::All
        } else {
            Self::Column(s)
        }
    }
}

impl From<&str> for Feature {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<Feature> for String {
    fn from(f: Feature) -> Self {
        match f {
            Feature::All => "All".to_owned(),
            Feature::Column(name) => name,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Column(name) => f.write_str(name),
        }
    }
}

/// Dimensionality-reduction family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReducerKind {
    /// Neighbor-graph manifold learner with a reusable fitted model.
    Umap,
    /// Probabilistic neighbor embedding, fit and discard.
    Tsne,
}

impl FromStr for ReducerKind {
    type Err = KeyfiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "umap" => Ok(Self::Umap),
            "tsne" => Ok(Self::Tsne),
            _ => Err(KeyfiError::invalid_argument(format!(
                "unknown embedding algorithm '{s}', expected UMAP or TSNE"
            ))),
        }
    }
}

impl fmt::Display for ReducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Umap => f.write_str("UMAP"),
            Self::Tsne => f.write_str("TSNE"),
        }
    }
}

/// Clustering family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClustererKind {
    /// Density-based hierarchy; may label noise `-1`.
    Hdbscan,
    /// Centroid-based partition into a fixed number of clusters.
    KMeans,
}

impl FromStr for ClustererKind {
    type Err = KeyfiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "hdbscan" => Ok(Self::Hdbscan),
            "kmeans" => Ok(Self::KMeans),
            _ => Err(KeyfiError::invalid_argument(format!(
                "unknown clustering algorithm '{s}', expected HDBSCAN or KMeans"
            ))),
        }
    }
}

impl fmt::Display for ClustererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hdbscan => f.write_str("HDBSCAN"),
            Self::KMeans => f.write_str("KMeans"),
        }
    }
}
