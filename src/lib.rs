//! # Keyfi - Flow field feature discovery
//!
//! Keyfi turns simulation output into a two-dimensional picture of its
//! structure. A mesh's per-sample arrays are flattened into a numeric table,
//! cleaned, optionally rescaled, embedded with UMAP or t-SNE and clustered
//! with HDBSCAN or k-means. The labels can be written back onto the mesh and
//! every stage can be plotted.
//!
//! ## Quick Start
//!
//! ```no_run
//! use keyfi::dimred::{CleanOptions, Clusterer, EmbedOptions, Reducer, clean, cluster, embed};
//! use keyfi::mesh::{FlattenOptions, JsonMeshIo, MeshIo as _, import_mesh};
//! use std::path::Path;
//!
//! let mesh = JsonMeshIo::default().read(Path::new("flow.json"))?;
//! let (table, _mesh) = import_mesh(&mesh, &FlattenOptions::default())?;
//! let table = clean(&table, &CleanOptions::default())?;
//! let (embedding, _model) = embed(&table, &Reducer::default(), &EmbedOptions::default())?;
//! let clusters = cluster(&embedding, &Clusterer::default())?;
//! println!("{} clusters", clusters.n_clusters());
//! # Ok::<(), keyfi::error::KeyfiError>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`mesh`]: mesh model, flattening and mesh file I/O
//! - [`table`]: the flattened numeric table
//! - [`dimred`]: cleaning, scaling, embedding and clustering
//! - [`algorithms`]: the UMAP and HDBSCAN implementations
//! - [`plot`]: colors, figures, PNG output and the interactive viewer
//! - [`pipeline`]: JSON run specifications and their execution
//! - [`config`], [`logging`], [`error`]: application plumbing

#![warn(clippy::all, rust_2018_idioms)]

pub mod algorithms;
pub mod config;
pub mod dimred;
pub mod error;
pub mod logging;
pub mod mesh;
pub mod pipeline;
pub mod plot;
pub mod table;
