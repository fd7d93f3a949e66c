//! Visualization of embeddings and clusterings.
//!
//! View builders in [`figure`] turn pipeline results into a backend-neutral
//! [`Figure`]; [`render`] then either writes it to a PNG ([`raster`]) or opens
//! an interactive window ([`viewer`]). All styling comes from an explicit
//! [`RenderConfig`], there is no global plot state.

pub mod colors;
pub mod figure;
pub mod raster;
pub mod style;
pub mod viewer;

pub use colors::{MemberColors, NOISE_COLOR, colorize, desaturate, desaturation, inferno, palette};
pub use figure::{
    Figure, FilledRect, Guide, LegendEntry, Scatter, clustering_view, condensed_tree_view,
    embedding_view, membership_view, model_view,
};
pub use style::RenderConfig;

use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};

/// Non-fatal advisory about data that will not plot well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataShapeWarning {
    pub n_clusters: usize,
    pub message: String,
}

impl DataShapeWarning {
    pub fn new(n_clusters: usize, message: impl Into<String>) -> Self {
        Self {
            n_clusters,
            message: message.into(),
        }
    }
}

impl fmt::Display for DataShapeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Where a figure goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Interactive window, blocking until closed.
    Show,
    /// PNG file.
    Save(PathBuf),
}

impl Output {
    /// `<dir>/<name>.png`.
    pub fn save_named(dir: &Path, name: &str) -> Self {
        Self::Save(dir.join(format!("{name}.png")))
    }
}

pub fn render(figure: &Figure, output: &Output, config: &RenderConfig) -> Result<()> {
    match output {
        Output::Show => viewer::show(figure, config),
        Output::Save(path) => raster::save_png(figure, path, config),
    }
}
