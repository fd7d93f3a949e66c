//! Run specifications and their headless execution.
//!
//! A run specification is a versioned JSON document describing one pass over
//! a dataset: where the mesh (or CSV table) lives, how it is flattened and
//! cleaned, which embedding and clustering algorithms run with which
//! parameters, and which figures and files come out at the end.
//!
//! # Example
//!
//! ```no_run
//! use keyfi::mesh::JsonMeshIo;
//! use keyfi::pipeline::{PipelineSpec, RunOptions, run_pipeline};
//!
//! let spec = PipelineSpec::from_file("run.json")?;
//! let report = run_pipeline(&spec, &JsonMeshIo::default(), &RunOptions::default())?;
//! println!("{}", report.summary());
//! # Ok::<(), keyfi::error::KeyfiError>(())
//! ```

pub mod executor;
pub mod spec;

pub use executor::{PipelineRun, RunOptions, RunReport, StageTiming, execute, run_pipeline};
pub use spec::{
    AlgorithmConfig, ClusteringConfig, DumpConfig, EmbeddingConfig, InputConfig, InputFormat,
    OutputConfig, PipelineSpec, PlotRequest, PlotView, ResolvedAlgorithms, SPEC_VERSION,
    expand_path_template,
};
