//! In-memory tile store.
//!
//! Keeps decoded rasters in hash maps. Used by tests and by the command-line
//! tool; it also serves as the reference implementation of the store traits.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use pyramid_common::{Crs, TileCoord};

use super::{Mosaic, MosaicGeometry, Pyramid, StoreCapability, Tile, TileStore, TileStream};
use crate::error::{PyramidError, Result};
use crate::types::{Raster, SampleDimension};

/// Channel depth used by batch fetches.
const FETCH_BUFFER: usize = 16;

#[derive(Default)]
struct MosaicTiles {
    tiles: HashMap<TileCoord, Arc<Raster>>,
    /// Tiles whose decode fails on read.
    corrupt: HashSet<TileCoord>,
    largest_batch: usize,
}

impl MosaicTiles {
    fn read(&self, coord: TileCoord) -> Result<Option<Arc<Raster>>> {
        if self.corrupt.contains(&coord) {
            return Err(PyramidError::tile_decode(coord.x, coord.y, "corrupt tile data"));
        }
        Ok(self.tiles.get(&coord).cloned())
    }
}

/// One mosaic held in memory.
pub struct InMemoryMosaic {
    geometry: MosaicGeometry,
    state: Arc<RwLock<MosaicTiles>>,
}

impl InMemoryMosaic {
    pub fn new(geometry: MosaicGeometry) -> Self {
        Self {
            geometry,
            state: Arc::new(RwLock::new(MosaicTiles::default())),
        }
    }

    /// Store one tile directly.
    pub fn put_tile(&self, coord: TileCoord, raster: Raster) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.tiles.insert(coord, Arc::new(raster));
    }

    /// Make reads of `coord` fail with a decode error.
    pub fn mark_corrupt(&self, coord: TileCoord) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.corrupt.insert(coord);
    }

    /// Number of stored tiles.
    pub fn tile_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.tiles.len()
    }

    /// Size of the largest `write_tiles` batch seen so far.
    pub fn largest_write_batch(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.largest_batch
    }
}

#[async_trait]
impl Mosaic for InMemoryMosaic {
    fn geometry(&self) -> &MosaicGeometry {
        &self.geometry
    }

    fn is_missing(&self, x: u32, y: u32) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        !state.tiles.contains_key(&TileCoord::new(x, y))
    }

    async fn get_tile(&self, coord: TileCoord) -> Result<Option<Arc<Raster>>> {
        if !self.geometry.contains_tile(coord) {
            return Ok(None);
        }
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.read(coord)
    }

    /// Tiles are produced by a spawned task through a bounded channel, the
    /// way a storage backend streams a batch.
    async fn get_tiles(&self, coords: Vec<TileCoord>) -> Result<TileStream> {
        let (tx, rx) = mpsc::channel(FETCH_BUFFER);
        let state = Arc::clone(&self.state);
        let geometry = self.geometry.clone();

        tokio::spawn(async move {
            for coord in coords {
                let item = if geometry.contains_tile(coord) {
                    let state = state.read().unwrap_or_else(PoisonError::into_inner);
                    state.read(coord)
                } else {
                    Ok(None)
                };
                let item = item.map(|raster| Tile { coord, raster });
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn write_tiles(&self, tiles: Vec<Tile>) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.largest_batch = state.largest_batch.max(tiles.len());
        for tile in tiles {
            if !self.geometry.contains_tile(tile.coord) {
                return Err(PyramidError::invalid_geometry(format!(
                    "tile {} outside mosaic {}",
                    tile.coord.key(),
                    self.geometry.id
                )));
            }
            state.corrupt.remove(&tile.coord);
            match tile.raster {
                Some(raster) => {
                    state.tiles.insert(tile.coord, raster);
                }
                None => {
                    state.tiles.remove(&tile.coord);
                }
            }
        }
        Ok(())
    }
}

/// A pyramid held in memory.
pub struct InMemoryPyramid {
    id: String,
    crs: Crs,
    mosaics: RwLock<Vec<Arc<InMemoryMosaic>>>,
}

impl InMemoryPyramid {
    pub fn new(id: impl Into<String>, crs: Crs) -> Self {
        Self {
            id: id.into(),
            crs,
            mosaics: RwLock::new(Vec::new()),
        }
    }

    /// Add a mosaic after checking its geometry against the pyramid CRS.
    pub fn create_mosaic(&self, geometry: MosaicGeometry) -> Result<Arc<InMemoryMosaic>> {
        geometry.validate(&self.crs)?;
        let mosaic = Arc::new(InMemoryMosaic::new(geometry));
        let mut mosaics = self.mosaics.write().unwrap_or_else(PoisonError::into_inner);
        mosaics.push(Arc::clone(&mosaic));
        Ok(mosaic)
    }

    /// Concrete mosaics, for direct tile access.
    pub fn in_memory_mosaics(&self) -> Vec<Arc<InMemoryMosaic>> {
        self.mosaics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mosaic(&self, id: &str) -> Option<Arc<InMemoryMosaic>> {
        self.in_memory_mosaics()
            .into_iter()
            .find(|m| m.geometry().id == id)
    }

    pub fn tile_count(&self) -> usize {
        self.in_memory_mosaics().iter().map(|m| m.tile_count()).sum()
    }
}

impl Pyramid for InMemoryPyramid {
    fn id(&self) -> &str {
        &self.id
    }

    fn crs(&self) -> &Crs {
        &self.crs
    }

    fn mosaics(&self) -> Vec<Arc<dyn Mosaic>> {
        self.in_memory_mosaics()
            .into_iter()
            .map(|m| m as Arc<dyn Mosaic>)
            .collect()
    }
}

/// A tile store held in memory.
pub struct InMemoryTileStore {
    id: String,
    sample_dimensions: Vec<SampleDimension>,
    capability: StoreCapability,
    pyramids: RwLock<Vec<Arc<InMemoryPyramid>>>,
}

impl InMemoryTileStore {
    pub fn new(id: impl Into<String>, sample_dimensions: Vec<SampleDimension>) -> Self {
        Self {
            id: id.into(),
            sample_dimensions,
            capability: StoreCapability::ReadWrite,
            pyramids: RwLock::new(Vec::new()),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.capability = StoreCapability::ReadOnly;
        self
    }

    /// Create a pyramid with one empty mosaic per geometry.
    pub fn create_pyramid(
        &self,
        id: impl Into<String>,
        crs: Crs,
        geometries: Vec<MosaicGeometry>,
    ) -> Result<Arc<InMemoryPyramid>> {
        let pyramid = Arc::new(InMemoryPyramid::new(id, crs));
        for geometry in geometries {
            pyramid.create_mosaic(geometry)?;
        }
        debug!(
            store = %self.id,
            pyramid = %pyramid.id,
            crs = %pyramid.crs,
            mosaics = pyramid.in_memory_mosaics().len(),
            "Created pyramid"
        );
        let mut pyramids = self.pyramids.write().unwrap_or_else(PoisonError::into_inner);
        pyramids.push(Arc::clone(&pyramid));
        Ok(pyramid)
    }

    pub fn pyramid(&self, id: &str) -> Option<Arc<InMemoryPyramid>> {
        self.pyramids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Number of stored tiles across all pyramids.
    pub fn tile_count(&self) -> usize {
        self.pyramids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.tile_count())
            .sum()
    }
}

impl TileStore for InMemoryTileStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn pyramids(&self) -> Vec<Arc<dyn Pyramid>> {
        self.pyramids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn Pyramid>)
            .collect()
    }

    fn sample_dimensions(&self) -> Vec<SampleDimension> {
        self.sample_dimensions.clone()
    }

    fn capability(&self) -> StoreCapability {
        self.capability
    }
}
