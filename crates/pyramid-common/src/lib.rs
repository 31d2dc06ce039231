//! Common geometry types shared across the tile pyramid crates.

pub mod bbox;
pub mod crs;
pub mod envelope;
pub mod grid;
pub mod tile;

pub use bbox::BoundingBox;
pub use crs::{AxisKind, Crs, CrsCode, ExtraAxis};
pub use envelope::{AxisRange, Envelope};
pub use grid::{AffineTransform, GridGeometry};
pub use tile::{PixelRect, TileCoord, TileRange};
