//! Error types for the editing engine.
//!
//! `OutOfRange` is an integration fault: engines clip and mask before they
//! touch the layer stack, so seeing it at runtime means a caller skipped that
//! step. `Format` and `Io` are the recoverable import/export failures.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// Pixel or layer index outside the canvas / stack.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Unrecognised or corrupt image data, or an unsupported export token.
    #[error("format error: {0}")]
    Format(String),

    /// Filesystem failure during import or export.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Attempt to remove the only remaining layer.
    #[error("cannot remove the last layer of the stack")]
    LastLayer,

    /// Malformed native project file.
    #[error("invalid project file: {0}")]
    Project(String),
}

impl EditorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EditorError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the failures a user can act on (bad file, missing file).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EditorError::OutOfRange(_) | EditorError::LastLayer)
    }
}

/// Failure while reading or writing a window layout file.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("layout I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("layout file truncated: expected {expected} geometry bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("layout file has no state block")]
    MissingState,

    #[error("geometry block too large ({0} bytes, limit 255)")]
    GeometryTooLarge(usize),
}
