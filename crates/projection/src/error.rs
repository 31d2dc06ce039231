//! Error types for coordinate transformations.

use pyramid_common::CrsCode;
use thiserror::Error;

pub type TransformResult<T> = std::result::Result<T, TransformError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// No transformation path is known between the two systems.
    #[error("No transform from {from} to {to}")]
    NoPath { from: CrsCode, to: CrsCode },

    /// The point cannot be represented in the target system.
    #[error("Point ({x}, {y}) is outside the domain of {crs}")]
    OutOfDomain { x: f64, y: f64, crs: CrsCode },

    /// An affine step could not be inverted.
    #[error("Non-invertible transform: {0}")]
    NonInvertible(String),
}
