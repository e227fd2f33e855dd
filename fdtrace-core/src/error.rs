//! Error types for fdtrace-core.

use thiserror::Error;

/// Result type alias for fdtrace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for fdtrace operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Mirror index outside the loaded geometry.
    #[error("invalid mirror index {index}: geometry has {count} mirror(s)")]
    InvalidMirror { index: usize, count: usize },

    /// Segment index outside the selected mirror.
    #[error("invalid segment index {index} on mirror {mirror}: mirror has {count} segment(s)")]
    InvalidSegment {
        mirror: usize,
        index: usize,
        count: usize,
    },

    /// Unknown numeric site identifier.
    #[error("unknown site id: {0}")]
    UnknownSite(i32),

    /// Geometry failed validation.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Parameter value out of range or not finite.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl Error {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
