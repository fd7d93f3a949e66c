//! In-crate algorithm providers for the embedding and clustering stages.

pub mod hdbscan;
pub mod umap;
