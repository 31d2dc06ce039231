//! Lazy, tile-cached image view over a mosaic.

use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use pyramid_common::{AffineTransform, PixelRect, TileCoord, TileRange};

use crate::cache::TileCache;
use crate::config::TileCacheConfig;
use crate::error::{PyramidError, Result};
use crate::region::mosaic_grid_to_world;
use crate::store::Mosaic;
use crate::types::{fill_values, CacheStats, Raster, SampleDimension, SampleType};

/// Sample type and band count shared by every pixel of an assembled image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleModel {
    pub sample_type: SampleType,
    pub bands: usize,
}

impl SampleModel {
    /// Model from declared band metadata: widest declared type (`F32` when
    /// nothing is declared), one band per dimension.
    pub fn declared(dimensions: &[SampleDimension]) -> Self {
        let sample_type = dimensions
            .iter()
            .map(|d| d.sample_type)
            .reduce(SampleType::widen)
            .unwrap_or(SampleType::F32);
        Self {
            sample_type,
            bands: dimensions.len().max(1),
        }
    }

    /// Model able to hold both `self` and `raster` without loss.
    pub fn widen_with(self, raster: &Raster) -> Self {
        Self {
            sample_type: self.sample_type.widen(raster.sample_type()),
            bands: self.bands.max(raster.bands),
        }
    }

    /// Model discovered from a loaded tile, widened by the declared bands.
    pub fn discover(raster: &Raster, dimensions: &[SampleDimension]) -> Self {
        let sample_type = dimensions
            .iter()
            .map(|d| d.sample_type)
            .fold(raster.sample_type(), SampleType::widen);
        Self {
            sample_type,
            bands: raster.bands.max(dimensions.len()),
        }
    }

    /// Whether `raster` can be copied into this model as is.
    pub fn matches(&self, raster: &Raster) -> bool {
        raster.sample_type() == self.sample_type && raster.bands == self.bands
    }
}

/// Per-band fill values for `bands` bands (0 beyond the declared bands).
pub(crate) fn band_fill(dimensions: &[SampleDimension], bands: usize) -> Vec<f64> {
    let mut fill = fill_values(dimensions);
    fill.resize(bands, 0.0);
    fill
}

/// A pixel window of one mosaic presented as a single image.
///
/// Tiles are decoded on first access and kept in a private LRU cache.
/// Missing tiles, and tiles that fail to decode, read as fill values.
pub struct MosaicImage {
    mosaic: Arc<dyn Mosaic>,
    window: PixelRect,
    sample_dimensions: Vec<SampleDimension>,
    cache: Mutex<TileCache>,
    /// Widened as tiles are loaded, never narrowed.
    model: RwLock<Option<SampleModel>>,
}

impl std::fmt::Debug for MosaicImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MosaicImage")
            .field("mosaic", &self.mosaic.id())
            .field("window", &self.window)
            .field("model", &self.known_model())
            .finish()
    }
}

impl MosaicImage {
    /// View over `window` (mosaic pixel coordinates, clipped to the mosaic).
    pub fn new(
        mosaic: Arc<dyn Mosaic>,
        window: PixelRect,
        sample_dimensions: Vec<SampleDimension>,
        cache_config: &TileCacheConfig,
    ) -> Result<Self> {
        let geometry = mosaic.geometry();
        let full = PixelRect::new(0, 0, geometry.pixel_width(), geometry.pixel_height());
        let window = full.intersection(&window).ok_or_else(|| {
            PyramidError::invalid_geometry(format!(
                "window {:?} outside mosaic {}",
                window, geometry.id
            ))
        })?;

        Ok(Self {
            mosaic,
            window,
            sample_dimensions,
            cache: Mutex::new(TileCache::new(cache_config)),
            model: RwLock::new(None),
        })
    }

    /// View over the whole mosaic.
    pub fn full(
        mosaic: Arc<dyn Mosaic>,
        sample_dimensions: Vec<SampleDimension>,
        cache_config: &TileCacheConfig,
    ) -> Result<Self> {
        let geometry = mosaic.geometry();
        let window = PixelRect::new(0, 0, geometry.pixel_width(), geometry.pixel_height());
        Self::new(mosaic, window, sample_dimensions, cache_config)
    }

    pub fn mosaic(&self) -> &Arc<dyn Mosaic> {
        &self.mosaic
    }

    /// Window in mosaic pixel coordinates.
    pub fn window(&self) -> PixelRect {
        self.window
    }

    pub fn width(&self) -> usize {
        self.window.width as usize
    }

    pub fn height(&self) -> usize {
        self.window.height as usize
    }

    /// Transform from image pixel space to world coordinates.
    pub fn grid_to_world(&self) -> AffineTransform {
        mosaic_grid_to_world(self.mosaic.geometry())
            .offset_pixels(self.window.x as f64, self.window.y as f64)
    }

    /// The sample model if it is already known.
    pub fn known_model(&self) -> Option<SampleModel> {
        *self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Model able to hold every tile loaded so far plus `loaded`.
    fn model_for(&self, loaded: &[&Raster]) -> SampleModel {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        let Some((first, rest)) = loaded.split_first() else {
            return (*slot).unwrap_or_else(|| SampleModel::declared(&self.sample_dimensions));
        };
        let base = (*slot).unwrap_or_else(|| SampleModel::discover(first, &self.sample_dimensions));
        let model = rest
            .iter()
            .fold(base.widen_with(first), |model, raster| model.widen_with(raster));
        if *slot != Some(model) {
            debug!(mosaic = %self.mosaic.id(), ?model, "Sample model widened");
        }
        *slot = Some(model);
        model
    }

    fn blank(&self, model: SampleModel, width: usize, height: usize) -> Raster {
        let fill = band_fill(&self.sample_dimensions, model.bands);
        Raster::filled(width, height, model.bands, model.sample_type, &fill)
    }

    fn conform(&self, raster: &Raster, model: SampleModel) -> Raster {
        if model.matches(raster) {
            return raster.clone();
        }
        let fill = band_fill(&self.sample_dimensions, model.bands);
        raster.convert(model.sample_type, model.bands, &fill)
    }

    /// Decoded raster of tile `coord` as stored, `None` when missing or
    /// unreadable.
    async fn fetch(&self, coord: TileCoord) -> Option<Arc<Raster>> {
        if let Some(raster) = self.cache.lock().await.get(&coord) {
            return Some(raster);
        }

        if self.mosaic.is_missing(coord.x, coord.y) {
            return None;
        }

        match self.mosaic.get_tile(coord).await {
            Ok(Some(raster)) => {
                self.cache.lock().await.insert(coord, Arc::clone(&raster));
                Some(raster)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    mosaic = %self.mosaic.id(),
                    tile = %coord.key(),
                    error = %err,
                    "Tile decode failed, treating as missing"
                );
                None
            }
        }
    }

    /// Raster of tile `(x, y)` converted to the image's sample model.
    /// Missing tiles come back filled with the no-data pattern.
    pub async fn tile(&self, x: u32, y: u32) -> Result<Raster> {
        let coord = TileCoord::new(x, y);
        let geometry = self.mosaic.geometry();
        if !geometry.contains_tile(coord) {
            return Err(PyramidError::invalid_geometry(format!(
                "tile {} outside mosaic {}",
                coord.key(),
                geometry.id
            )));
        }

        let raw = self.fetch(coord).await;
        let model = self.model_for(raw.as_deref().as_slice());
        Ok(match raw {
            Some(raster) => self.conform(&raster, model),
            None => self.blank(model, geometry.tile_size.0, geometry.tile_size.1),
        })
    }

    /// Assemble `rect` (image pixel coordinates) into one raster.
    pub async fn region(&self, rect: PixelRect) -> Result<Raster> {
        let local = PixelRect::new(0, 0, self.window.width, self.window.height);
        let rect = local.intersection(&rect).ok_or_else(|| {
            PyramidError::invalid_geometry(format!("region {:?} outside image", rect))
        })?;
        // Same rectangle in mosaic pixels.
        let absolute = PixelRect::new(
            rect.x + self.window.x,
            rect.y + self.window.y,
            rect.width,
            rect.height,
        );

        let geometry = self.mosaic.geometry();
        let tw = geometry.tile_size.0 as u64;
        let th = geometry.tile_size.1 as u64;
        let range = TileRange::new(
            (absolute.x / tw) as u32,
            (absolute.y / th) as u32,
            absolute.max_x().div_ceil(tw) as u32,
            absolute.max_y().div_ceil(th) as u32,
        );

        let mut loaded = Vec::with_capacity(range.len());
        for coord in range.iter() {
            if let Some(raster) = self.fetch(coord).await {
                loaded.push((coord, raster));
            }
        }

        let rasters: Vec<&Raster> = loaded.iter().map(|(_, r)| r.as_ref()).collect();
        let model = self.model_for(&rasters);
        let mut out = self.blank(model, rect.width as usize, rect.height as usize);

        for (coord, raster) in &loaded {
            let tile_rect = PixelRect::new(coord.x as u64 * tw, coord.y as u64 * th, tw, th);
            let Some(overlap) = tile_rect.intersection(&absolute) else {
                continue;
            };
            let tile = self.conform(raster, model);
            out.copy_region(
                &tile,
                overlap.relative_to(tile_rect.x, tile_rect.y),
                (overlap.x - absolute.x) as usize,
                (overlap.y - absolute.y) as usize,
            );
        }

        debug!(
            mosaic = %self.mosaic.id(),
            tiles = range.len(),
            loaded = loaded.len(),
            width = rect.width,
            height = rect.height,
            "Assembled mosaic region"
        );

        Ok(out)
    }

    /// Assemble the whole window.
    pub async fn read_all(&self) -> Result<Raster> {
        self.region(PixelRect::new(0, 0, self.window.width, self.window.height))
            .await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }
}
