//! On-demand tile generation from a coverage source.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, info};

use projection::{CoordinateTransformService, TransformChain};
use pyramid_common::{AxisRange, Envelope, GridGeometry, PixelRect, TileCoord};

use crate::config::EngineConfig;
use crate::coverage::{GridCoverage, ReadOutput};
use crate::error::{PyramidError, Result};
use crate::image::{band_fill, SampleModel};
use crate::reader::{PyramidReader, ReadRequest};
use crate::region::{envelope_to_tile_range, mosaic_envelope, tile_to_world};
use crate::resample::{GridResampler, ResampleOptions, Resampler};
use crate::store::{Mosaic, Pyramid, StoreCapability, Tile, TileStore};
use crate::types::{Raster, SampleDimension};

/// Something that can produce a coverage over a grid geometry.
#[async_trait]
pub trait CoverageSource: Send + Sync {
    /// Coverage covering `geometry`, or `None` when the source has no data
    /// there. The result may be larger than `geometry` or in another CRS.
    async fn read(&self, geometry: &GridGeometry) -> Result<Option<GridCoverage>>;
}

#[async_trait]
impl CoverageSource for GridCoverage {
    async fn read(&self, geometry: &GridGeometry) -> Result<Option<GridCoverage>> {
        if self.geometry.crs.same_horizontal(&geometry.crs)
            && !self.geometry.bbox().intersects(&geometry.bbox())
        {
            return Ok(None);
        }
        Ok(Some(self.clone()))
    }
}

#[async_trait]
impl CoverageSource for PyramidReader {
    async fn read(&self, geometry: &GridGeometry) -> Result<Option<GridCoverage>> {
        match PyramidReader::read(self, &ReadRequest::from_grid(geometry)).await {
            Ok(ReadOutput::Coverage(coverage)) => Ok(Some(coverage)),
            Ok(ReadOutput::Stack(_)) => Err(PyramidError::structure(
                "source read for one tile produced a coverage stack",
            )),
            Err(err) if err.is_disjoint() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Whether every sample of `raster` equals its band's fill value.
pub fn is_empty(raster: &Raster, fill: &[f64]) -> bool {
    raster.is_all_fill(fill)
}

/// A generated tile and whether it holds only fill values.
#[derive(Debug, Clone)]
pub struct GeneratedTile {
    pub tile: Tile,
    pub empty: bool,
}

impl GeneratedTile {
    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

/// Summary of [`TileGenerator::generate_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub tiles_generated: usize,
    pub tiles_empty: usize,
    pub tiles_written: usize,
    pub mosaics: usize,
}

/// Builds pyramid tiles from a [`CoverageSource`].
pub struct TileGenerator {
    source: Arc<dyn CoverageSource>,
    sample_dimensions: Vec<SampleDimension>,
    transforms: Arc<dyn CoordinateTransformService>,
    resampler: Arc<dyn Resampler>,
    config: EngineConfig,
}

impl TileGenerator {
    pub fn new(
        source: Arc<dyn CoverageSource>,
        sample_dimensions: Vec<SampleDimension>,
        transforms: Arc<dyn CoordinateTransformService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            sample_dimensions,
            transforms,
            resampler: Arc::new(GridResampler::new()),
            config,
        }
    }

    pub fn with_resampler(mut self, resampler: Arc<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    /// Per-band fill values of generated tiles.
    pub fn fill_values(&self) -> Vec<f64> {
        band_fill(
            &self.sample_dimensions,
            SampleModel::declared(&self.sample_dimensions).bands,
        )
    }

    /// Exact grid geometry of one tile.
    pub fn tile_geometry(pyramid: &dyn Pyramid, mosaic: &dyn Mosaic, coord: TileCoord) -> GridGeometry {
        let geometry = mosaic.geometry();
        GridGeometry::new(
            geometry.tile_size.0,
            geometry.tile_size.1,
            tile_to_world(geometry, coord.x, coord.y),
            pyramid.crs().clone(),
        )
        .with_slice(
            geometry
                .slice_values()
                .iter()
                .map(|&v| AxisRange::point(v))
                .collect(),
        )
    }

    /// Generate tile `coord` of `mosaic` from the source.
    pub async fn generate_tile(
        &self,
        pyramid: &dyn Pyramid,
        mosaic: &dyn Mosaic,
        coord: TileCoord,
    ) -> Result<GeneratedTile> {
        if !mosaic.geometry().contains_tile(coord) {
            return Err(PyramidError::invalid_geometry(format!(
                "tile {} outside mosaic {}",
                coord.key(),
                mosaic.id()
            )));
        }

        let model = SampleModel::declared(&self.sample_dimensions);
        let fill = band_fill(&self.sample_dimensions, model.bands);
        let target = Self::tile_geometry(pyramid, mosaic, coord);
        let mut raster = Raster::filled(target.width, target.height, model.bands, model.sample_type, &fill);

        match self.source.read(&target).await? {
            None => {
                debug!(mosaic = %mosaic.id(), tile = %coord.key(), "Source has no data for tile");
            }
            Some(coverage) => {
                let chain = TransformChain::new()
                    .then_affine(target.grid_to_world)
                    .then_reproject(
                        Arc::clone(&self.transforms),
                        target.crs.code,
                        coverage.geometry.crs.code,
                    )?
                    .then_inverse_affine(&coverage.geometry.grid_to_world)?;
                let source = coverage.render().await?;
                let options = ResampleOptions::new(self.config.interpolation, fill.clone(), self.config.border);
                let resampler = Arc::clone(&self.resampler);
                let area = PixelRect::new(0, 0, target.width as u64, target.height as u64);

                raster = tokio::task::spawn_blocking(move || {
                    resampler
                        .resample(&mut raster, area, &source, &chain, &options)
                        .map(|_| raster)
                })
                .await??;
            }
        }

        let empty = is_empty(&raster, &fill);
        Ok(GeneratedTile {
            tile: Tile::new(coord, raster),
            empty,
        })
    }

    /// Generate and store every tile of `store` intersecting `envelope`.
    ///
    /// Mosaics are processed one at a time. Within a mosaic up to
    /// `write_concurrency` tiles are generated at once and written back in
    /// batches of that size; empty tiles are not written.
    pub async fn generate_all(&self, store: &dyn TileStore, envelope: &Envelope) -> Result<GenerationReport> {
        if store.capability() != StoreCapability::ReadWrite {
            return Err(PyramidError::ReadOnly(store.id().to_string()));
        }

        let mut work: Vec<(Arc<dyn Pyramid>, Arc<dyn Mosaic>, Vec<TileCoord>)> = Vec::new();
        for pyramid in store.pyramids() {
            let bbox = if pyramid.crs().same_horizontal(&envelope.crs) {
                envelope.bbox
            } else {
                self.transforms
                    .transform_bbox(envelope.crs.code, pyramid.crs().code, &envelope.bbox)?
            };
            let query = Envelope::new(pyramid.crs().clone(), bbox)
                .with_extra(envelope.extra.iter().copied());
            for mosaic in pyramid.mosaics() {
                if !mosaic_envelope(mosaic.geometry(), pyramid.crs()).intersects(&query) {
                    continue;
                }
                if let Some(selection) = envelope_to_tile_range(mosaic.geometry(), &bbox) {
                    let coords = selection.tiles.iter().collect();
                    work.push((Arc::clone(&pyramid), Arc::clone(&mosaic), coords));
                }
            }
        }

        debug!(store = %store.id(), mosaics = work.len(), "Generating tiles");

        let batch = self.config.write_concurrency.max(1);
        let mut report = GenerationReport::default();
        for (pyramid, mosaic, coords) in work {
            let (pyramid, mosaic) = (pyramid.as_ref(), mosaic.as_ref());
            let mut batches = pin!(stream::iter(coords)
                .map(|coord| self.generate_tile(pyramid, mosaic, coord))
                .buffer_unordered(batch)
                .chunks(batch));

            let mut written = 0;
            while let Some(results) = batches.next().await {
                let mut tiles = Vec::with_capacity(results.len());
                for result in results {
                    let generated = result?;
                    report.tiles_generated += 1;
                    if generated.empty {
                        report.tiles_empty += 1;
                    } else {
                        tiles.push(generated.tile);
                    }
                }
                if !tiles.is_empty() {
                    written += tiles.len();
                    mosaic.write_tiles(tiles).await?;
                }
            }

            if written > 0 {
                report.mosaics += 1;
                report.tiles_written += written;
            }
            debug!(pyramid = %pyramid.id(), mosaic = %mosaic.id(), written, "Mosaic tiles generated");
        }

        info!(
            store = %store.id(),
            generated = report.tiles_generated,
            empty = report.tiles_empty,
            written = report.tiles_written,
            "Tile generation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTileStore, MosaicGeometry};
    use crate::types::SampleType;
    use projection::StandardTransforms;
    use pyramid_common::{AffineTransform, BoundingBox, Crs, CrsCode};
    use test_utils::create_test_grid;

    fn dims() -> Vec<SampleDimension> {
        vec![SampleDimension::new("v", SampleType::F32).with_no_data(-1.0)]
    }

    fn source() -> Arc<GridCoverage> {
        let geometry = GridGeometry::new(
            4,
            4,
            AffineTransform::north_up(0.0, 0.0, 1.0),
            Crs::new(CrsCode::Epsg3857),
        );
        Arc::new(
            GridCoverage::new(geometry, dims(), Raster::from_f32(4, 4, create_test_grid(4, 4)).unwrap())
                .unwrap(),
        )
    }

    fn generator(config: EngineConfig) -> TileGenerator {
        TileGenerator::new(source(), dims(), StandardTransforms::shared(), config)
    }

    fn nearest() -> EngineConfig {
        EngineConfig {
            interpolation: crate::types::InterpolationMethod::Nearest,
            ..EngineConfig::default()
        }
    }

    fn target_store() -> Arc<InMemoryTileStore> {
        let store = InMemoryTileStore::new("t", dims());
        store
            .create_pyramid(
                "p",
                Crs::new(CrsCode::Epsg3857),
                vec![MosaicGeometry::new("0", 1.0, (2, 2), (3, 3), vec![0.0, 0.0])],
            )
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_is_empty() {
        let blank = Raster::filled(2, 2, 1, SampleType::F32, &[-1.0]);
        assert!(is_empty(&blank, &[-1.0]));
        let mut one = blank.clone();
        one.set(1, 1, 0, 3.0);
        assert!(!is_empty(&one, &[-1.0]));
        let nan = Raster::filled(1, 1, 1, SampleType::F32, &[f64::NAN]);
        assert!(is_empty(&nan, &[f64::NAN]));
    }

    #[tokio::test]
    async fn test_generate_tile_with_data() {
        let store = target_store();
        let pyramid = store.pyramid("p").unwrap();
        let mosaic = pyramid.mosaic("0").unwrap();

        let generated = generator(nearest())
            .generate_tile(pyramid.as_ref(), mosaic.as_ref(), TileCoord::new(1, 0))
            .await
            .unwrap();
        assert!(!generated.is_empty());
        let raster = generated.tile.raster.unwrap();
        assert_eq!(raster.get(0, 0, 0), 2000.0);
        assert_eq!(raster.get(1, 1, 0), 3001.0);
    }

    #[tokio::test]
    async fn test_generate_tile_outside_source_is_empty() {
        let store = target_store();
        let pyramid = store.pyramid("p").unwrap();
        let mosaic = pyramid.mosaic("0").unwrap();

        let generated = generator(nearest())
            .generate_tile(pyramid.as_ref(), mosaic.as_ref(), TileCoord::new(2, 2))
            .await
            .unwrap();
        assert!(generated.is_empty());
        assert!(generated.tile.raster.unwrap().is_all_fill(&[-1.0]));

        let err = generator(nearest())
            .generate_tile(pyramid.as_ref(), mosaic.as_ref(), TileCoord::new(3, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PyramidError::InvalidGeometry(_)));
    }

    #[tokio::test]
    async fn test_generate_all_skips_empty_tiles() {
        let store = target_store();
        let envelope = Envelope::new(
            Crs::new(CrsCode::Epsg3857),
            BoundingBox::new(0.0, -6.0, 6.0, 0.0),
        );
        let report = generator(nearest())
            .generate_all(store.as_ref(), &envelope)
            .await
            .unwrap();

        assert_eq!(report.tiles_generated, 9);
        assert_eq!(report.tiles_written, 4);
        assert_eq!(report.tiles_empty, 5);
        assert_eq!(store.tile_count(), 4);
    }

    #[tokio::test]
    async fn test_generate_all_writes_in_bounded_batches() {
        let store = target_store();
        let envelope = Envelope::new(
            Crs::new(CrsCode::Epsg3857),
            BoundingBox::new(0.0, -6.0, 6.0, 0.0),
        );
        let config = EngineConfig {
            write_concurrency: 2,
            ..nearest()
        };
        let report = generator(config)
            .generate_all(store.as_ref(), &envelope)
            .await
            .unwrap();

        assert_eq!(report.tiles_written, 4);
        assert_eq!(report.mosaics, 1);
        let mosaic = store.pyramid("p").unwrap().mosaic("0").unwrap();
        assert_eq!(mosaic.tile_count(), 4);
        assert!(mosaic.largest_write_batch() <= 2);
    }
}
