//! Tile store contracts.
//!
//! A [`TileStore`] owns [`Pyramid`]s, one per CRS; a pyramid owns
//! [`Mosaic`]s, one per resolution level and slice. The engine never
//! decides how tiles are persisted, it only talks to these traits.

mod memory;

pub use memory::{InMemoryMosaic, InMemoryPyramid, InMemoryTileStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use pyramid_common::{Crs, PixelRect, TileCoord};

use crate::error::{PyramidError, Result};
use crate::types::{Raster, SampleDimension};

/// Receiving end of a batch tile fetch. The producer closes the channel
/// once every requested tile has been sent.
pub type TileStream = mpsc::Receiver<Result<Tile>>;

/// Whether a store accepts writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreCapability {
    ReadOnly,
    ReadWrite,
}

/// A tile position and its raster; `raster` is `None` for a missing tile.
#[derive(Debug, Clone)]
pub struct Tile {
    pub coord: TileCoord,
    pub raster: Option<Arc<Raster>>,
}

impl Tile {
    pub fn new(coord: TileCoord, raster: Raster) -> Self {
        Self {
            coord,
            raster: Some(Arc::new(raster)),
        }
    }

    pub fn missing(coord: TileCoord) -> Self {
        Self { coord, raster: None }
    }

    pub fn is_missing(&self) -> bool {
        self.raster.is_none()
    }
}

/// Geometry of one mosaic (resolution level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicGeometry {
    pub id: String,
    /// World units per pixel.
    pub scale: f64,
    /// Tile width and height in pixels.
    pub tile_size: (usize, usize),
    /// Tiles across and down.
    pub grid_size: (u32, u32),
    /// `[x, y, extra_0, ...]`: the outer upper-left corner followed by the
    /// slice ordinates of this mosaic.
    pub upper_left: Vec<f64>,
    /// Pixel bounds actually populated, when known.
    #[serde(default)]
    pub data_extent: Option<PixelRect>,
}

impl MosaicGeometry {
    pub fn new(
        id: impl Into<String>,
        scale: f64,
        tile_size: (usize, usize),
        grid_size: (u32, u32),
        upper_left: Vec<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            scale,
            tile_size,
            grid_size,
            upper_left,
            data_extent: None,
        }
    }

    pub fn with_data_extent(mut self, extent: PixelRect) -> Self {
        self.data_extent = Some(extent);
        self
    }

    /// Check the geometry against the CRS of its pyramid.
    pub fn validate(&self, crs: &Crs) -> Result<()> {
        if !(self.scale > 0.0 && self.scale.is_finite()) {
            return Err(PyramidError::invalid_geometry(format!(
                "mosaic {} has non-positive scale {}",
                self.id, self.scale
            )));
        }
        if self.tile_size.0 == 0 || self.tile_size.1 == 0 {
            return Err(PyramidError::invalid_geometry(format!(
                "mosaic {} has an empty tile size",
                self.id
            )));
        }
        if self.grid_size.0 == 0 || self.grid_size.1 == 0 {
            return Err(PyramidError::invalid_geometry(format!(
                "mosaic {} has an empty grid",
                self.id
            )));
        }
        if self.upper_left.len() != crs.dimension() {
            return Err(PyramidError::invalid_geometry(format!(
                "mosaic {} has {} corner ordinates, CRS {} needs {}",
                self.id,
                self.upper_left.len(),
                crs,
                crs.dimension()
            )));
        }
        Ok(())
    }

    /// Horizontal upper-left corner.
    pub fn origin(&self) -> (f64, f64) {
        (
            self.upper_left.first().copied().unwrap_or(0.0),
            self.upper_left.get(1).copied().unwrap_or(0.0),
        )
    }

    /// Ordinates along the extra axes.
    pub fn slice_values(&self) -> &[f64] {
        self.upper_left.get(2..).unwrap_or(&[])
    }

    pub fn pixel_width(&self) -> u64 {
        self.grid_size.0 as u64 * self.tile_size.0 as u64
    }

    pub fn pixel_height(&self) -> u64 {
        self.grid_size.1 as u64 * self.tile_size.1 as u64
    }

    pub fn contains_tile(&self, coord: TileCoord) -> bool {
        coord.x < self.grid_size.0 && coord.y < self.grid_size.1
    }

    pub fn tile_count(&self) -> usize {
        self.grid_size.0 as usize * self.grid_size.1 as usize
    }
}

/// A tile store: a set of pyramids sharing band metadata.
pub trait TileStore: Send + Sync {
    fn id(&self) -> &str;

    fn pyramids(&self) -> Vec<Arc<dyn Pyramid>>;

    /// One descriptor per band, shared by every tile of the store.
    fn sample_dimensions(&self) -> Vec<SampleDimension>;

    fn capability(&self) -> StoreCapability;
}

/// All resolution levels of one dataset in a single CRS.
pub trait Pyramid: Send + Sync {
    fn id(&self) -> &str;

    fn crs(&self) -> &Crs;

    fn mosaics(&self) -> Vec<Arc<dyn Mosaic>>;
}

/// One resolution level (and slice) of a pyramid.
#[async_trait]
pub trait Mosaic: Send + Sync {
    fn geometry(&self) -> &MosaicGeometry;

    fn id(&self) -> &str {
        &self.geometry().id
    }

    /// Whether tile `(x, y)` is absent from a sparse mosaic.
    fn is_missing(&self, x: u32, y: u32) -> bool;

    /// Fetch and decode one tile. `Ok(None)` means the tile is missing.
    async fn get_tile(&self, coord: TileCoord) -> Result<Option<Arc<Raster>>>;

    /// Fetch several tiles. Tiles arrive in any order; the channel closes
    /// once all have been sent. Per-tile failures arrive as `Err` items.
    async fn get_tiles(&self, coords: Vec<TileCoord>) -> Result<TileStream> {
        let (tx, rx) = mpsc::channel(coords.len().max(1));
        for coord in coords {
            let item = self
                .get_tile(coord)
                .await
                .map(|raster| Tile { coord, raster });
            if tx.send(item).await.is_err() {
                break;
            }
        }
        Ok(rx)
    }

    /// Store tiles. A tile without raster removes the stored tile.
    async fn write_tiles(&self, tiles: Vec<Tile>) -> Result<()>;
}

/// Drain a batch fetch until the producer closes it.
///
/// Each wait is bounded by `poll_interval`; `max_idle_polls` consecutive
/// waits without a tile abandon the fetch. Failed tiles are logged and
/// left out, missing tiles are left out.
pub async fn collect_tiles(
    mut stream: TileStream,
    poll_interval: Duration,
    max_idle_polls: u32,
) -> Result<Vec<(TileCoord, Arc<Raster>)>> {
    let mut received = Vec::new();
    let mut idle = 0u32;

    loop {
        match tokio::time::timeout(poll_interval, stream.recv()).await {
            Ok(Some(Ok(tile))) => {
                idle = 0;
                if let Some(raster) = tile.raster {
                    received.push((tile.coord, raster));
                }
            }
            Ok(Some(Err(err))) => {
                idle = 0;
                warn!(error = %err, "Tile fetch failed, treating as missing");
            }
            Ok(None) => break,
            Err(_) => {
                idle += 1;
                if idle >= max_idle_polls {
                    return Err(PyramidError::storage(format!(
                        "no tile received after {} polls of {:?}",
                        idle, poll_interval
                    )));
                }
            }
        }
    }

    Ok(received)
}
