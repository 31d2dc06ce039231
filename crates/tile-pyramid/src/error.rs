//! Error types for the tile pyramid engine.

use projection::TransformError;
use thiserror::Error;

/// Errors that can occur while reading or writing a pyramid.
#[derive(Error, Debug)]
pub enum PyramidError {
    /// The request does not overlap any data in the store.
    #[error("requested domain does not intersect the pyramid: {0}")]
    DisjointDomain(String),

    /// The store holds no pyramid.
    #[error("tile store contains no pyramid")]
    NoPyramid,

    /// A pyramid holds no mosaic.
    #[error("pyramid {0} contains no mosaic")]
    NoMosaic(String),

    /// A CRS transformation failed.
    #[error("coordinate transform failed: {0}")]
    Transform(#[from] TransformError),

    /// A single tile could not be decoded.
    #[error("failed to decode tile ({x}, {y}): {reason}")]
    TileDecode { x: u32, y: u32, reason: String },

    /// Mosaics of a pyramid cannot be arranged into a consistent cube.
    #[error("inconsistent pyramid structure: {0}")]
    StructuralInconsistency(String),

    /// A write was attempted on a read-only store.
    #[error("tile store {0} is read-only")]
    ReadOnly(String),

    /// A grid geometry or mosaic geometry is unusable.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Storage/IO error reported by the tile store.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Resampling failed.
    #[error("resample error: {0}")]
    Resample(String),
}

impl PyramidError {
    /// Create a DisjointDomain error.
    pub fn disjoint(msg: impl Into<String>) -> Self {
        Self::DisjointDomain(msg.into())
    }

    /// Create a TileDecode error.
    pub fn tile_decode(x: u32, y: u32, reason: impl Into<String>) -> Self {
        Self::TileDecode {
            x,
            y,
            reason: reason.into(),
        }
    }

    /// Create a StructuralInconsistency error.
    pub fn structure(msg: impl Into<String>) -> Self {
        Self::StructuralInconsistency(msg.into())
    }

    /// Create an InvalidGeometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create a Storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether this error only signals that the request misses the data.
    pub fn is_disjoint(&self) -> bool {
        matches!(self, Self::DisjointDomain(_))
    }
}

impl From<tokio::task::JoinError> for PyramidError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Resample(err.to_string())
    }
}

/// Result type for pyramid operations.
pub type Result<T> = std::result::Result<T, PyramidError>;
