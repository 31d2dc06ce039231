//! Coordinate reference system transformations.
//!
//! Provides the point/region transform capability consumed by the tile
//! pyramid engine, plus the small set of projections it ships with:
//! geographic (EPSG:4326, EPSG:4269) and spherical Web Mercator (EPSG:3857).

pub mod error;
pub mod mercator;
pub mod transform;

pub use error::{TransformError, TransformResult};
pub use transform::{CoordinateTransformService, StandardTransforms, TransformChain, TransformStep};
