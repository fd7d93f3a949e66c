//! Error taxonomy for the keyfi pipeline.
//!
//! Every stage validates its arguments before doing any expensive work, so the
//! variants fall into three groups:
//!
//! - [`KeyfiError::InvalidArgument`]: the caller asked for something that cannot
//!   be done (unknown scaler, bad `dim`, missing column, malformed color range).
//! - [`KeyfiError::Upstream`]: an embedding or clustering provider rejected its
//!   input. The provider error is kept as-is and displayed unchanged.
//! - Plumbing failures from the table engine, the filesystem, JSON and the
//!   plot backends.
//!
//! Non-fatal advisories are not errors; see
//! [`crate::plot::DataShapeWarning`].
//!
//! ```
//! use keyfi::error::{KeyfiError, Result};
//!
//! fn check_dim(dim: usize) -> Result<()> {
//!     if dim == 2 || dim == 3 {
//!         Ok(())
//!     } else {
//!         Err(KeyfiError::invalid_argument(format!("dim can only be 2 or 3, got {dim}")))
//!     }
//! }
//!
//! assert!(check_dim(4).is_err());
//! ```

use std::fmt;

/// Main error type for keyfi operations.
#[derive(Debug)]
pub enum KeyfiError {
    /// Bad argument detected before any work was done.
    InvalidArgument(String),

    /// Failure raised by an embedding or clustering provider, propagated unchanged.
    Upstream(Box<dyn std::error::Error + Send + Sync>),

    /// Table engine errors (Polars, shape mismatches, parsing)
    DataProcessing(String),

    /// I/O errors (mesh files, embedding dumps, images)
    Io(std::io::Error),

    /// Configuration and run specification errors
    Config(String),

    /// Plot backend errors
    Render(String),

    /// Generic error with context
    Other(String),
}

impl KeyfiError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Wraps a provider error without altering its message.
    pub fn upstream<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream(Box::new(err))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}

impl fmt::Display for KeyfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::Upstream(e) => write!(f, "{e}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Render(msg) => write!(f, "Render error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for KeyfiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Upstream(e) => Some(e.as_ref()),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyfiError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for KeyfiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for KeyfiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for KeyfiError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<ndarray::ShapeError> for KeyfiError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::DataProcessing(format!("shape error: {err}"))
    }
}

impl From<image::ImageError> for KeyfiError {
    fn from(err: image::ImageError) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<KeyfiError> for String {
    fn from(err: KeyfiError) -> Self {
        err.to_string()
    }
}

/// Result type alias for keyfi operations.
pub type Result<T> = std::result::Result<T, KeyfiError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<KeyfiError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: KeyfiError = e.into();
            KeyfiError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: KeyfiError = e.into();
            KeyfiError::Other(format!("{}: {}", f(), err))
        })
    }
}
