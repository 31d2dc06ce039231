//! Cache implementations for mosaic images.

mod tile_cache;

pub use tile_cache::TileCache;
