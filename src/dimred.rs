//! Field-table to embedding to clusters.
//!
//! Every stage is a pure, blocking function over its inputs: [`clean`] a
//! table, [`embed`] it (optionally through [`scale`]) and [`cluster`] the
//! embedding. Algorithm choice is made once through [`Reducer`] and
//! [`Clusterer`], and every stage returns the same shape regardless of which
//! algorithm ran.

pub mod cleaning;
pub mod clustering;
pub mod embedding;
pub mod scaling;
pub mod types;

pub use cleaning::{CleanOptions, clean};
pub use clustering::{ClusterResult, Clusterer, KMeansInitMethod, KMeansParams, cluster};
pub use embedding::{EmbedOptions, Embedding, Reducer, TsneParams, embed};
pub use scaling::{Scaled, scale, scale_column};
pub use types::{ClustererKind, Feature, ReducerKind, ScalerKind};

#[cfg(test)]
mod tests;
