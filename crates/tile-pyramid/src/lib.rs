//! Multi-resolution raster tile pyramid engine.
//!
//! A tile store holds pyramids (one per CRS) of mosaics (one per
//! resolution level and slice). This crate reads arbitrary regions back
//! out of such a store and writes source rasters into it:
//!
//! - **Reads**: pick the level closest to the wanted resolution, map the
//!   request onto whole tiles and assemble them into one coverage, or into
//!   a stack of coverages when the data has time/elevation slices
//! - **Writes**: resample a coverage into every intersecting tile of every
//!   level, in parallel
//! - **Generation**: build single tiles on demand from any coverage source
//!
//! # Architecture
//!
//! ```text
//! PyramidReader::read(request)
//!      │
//!      ├─► select_pyramid / select_mosaics (level choice)
//!      │
//!      ├─► envelope_to_tile_range (tiles + pixel window)
//!      │
//!      ├─► one mosaic:  batch fetch → assembled GridCoverage
//!      │                (or a lazy MosaicImage in deferred mode)
//!      │
//!      └─► several:     SliceNode tree → GridCoverageStack
//!
//! TileMatrixSetWriter::write(coverage)
//!      │
//!      ├─► plan() → TileJob per affected tile
//!      │
//!      └─► per mosaic: fetch tiles → resample (rayon) → write_tiles
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tile_pyramid::{EngineConfig, PyramidReader, ReadRequest};
//!
//! let reader = PyramidReader::new(store, StandardTransforms::shared(), EngineConfig::default());
//! let output = reader.read(&ReadRequest::new(envelope).with_resolution(10.0, 10.0)).await?;
//! if let Some(coverage) = output.as_coverage() {
//!     let raster = coverage.render().await?;
//! }
//! ```

pub mod cache;
pub mod config;
pub mod coverage;
pub mod error;
pub mod generator;
pub mod image;
pub mod layout;
pub mod reader;
pub mod region;
pub mod resample;
pub mod select;
pub mod store;
pub mod types;
pub mod writer;

// Re-export commonly used types at crate root
pub use cache::TileCache;
pub use config::{
    BorderPolicy, EngineConfig, LayoutConfig, ReadMode, ResolutionFallback, SelectionConfig,
    TieBreak, TileCacheConfig,
};
pub use coverage::{CoverageData, GridCoverage, GridCoverageStack, ReadOutput, StackSlice};
pub use error::{PyramidError, Result};
pub use generator::{is_empty, CoverageSource, GeneratedTile, GenerationReport, TileGenerator};
pub use image::{MosaicImage, SampleModel};
pub use layout::PyramidLayout;
pub use reader::{slice_ranges, PyramidReader, ReadRequest, SliceKey, SliceNode};
pub use region::{envelope_to_tile_range, tile_to_world, TileSelection};
pub use resample::{GridResampler, ResampleOptions, Resampler};
pub use select::{select_mosaics, select_pyramid, TargetResolution};
pub use store::{
    InMemoryMosaic, InMemoryPyramid, InMemoryTileStore, Mosaic, MosaicGeometry, Pyramid,
    StoreCapability, Tile, TileStore,
};
pub use writer::{TileMatrixSetWriter, WriteReport};
pub use types::{
    CacheStats, InterpolationMethod, Raster, RasterBuffer, SampleDimension, SampleType,
};
