//! Bulk pyramid updates from a source coverage.
//!
//! Every mosaic of every pyramid that intersects the target envelope gets
//! the covered part of each affected tile resampled from the source.
//! Tiles are independent units of work; within a mosaic they are
//! resampled in parallel on the rayon pool.

use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use projection::{CoordinateTransformService, TransformChain};
use pyramid_common::{AffineTransform, BoundingBox, Envelope, GridGeometry, PixelRect, TileCoord};

use crate::config::EngineConfig;
use crate::coverage::GridCoverage;
use crate::error::{PyramidError, Result};
use crate::image::{band_fill, SampleModel};
use crate::region::{envelope_to_tile_range, mosaic_envelope, tile_pixel_rect, tile_to_world};
use crate::resample::{GridResampler, ResampleOptions, Resampler};
use crate::store::{collect_tiles, Mosaic, Pyramid, StoreCapability, Tile, TileStore};
use crate::types::{InterpolationMethod, Raster};

/// One tile to update.
#[derive(Clone)]
pub struct TileJob {
    pub pyramid: Arc<dyn Pyramid>,
    pub mosaic: Arc<dyn Mosaic>,
    pub coord: TileCoord,
    /// Part of the tile covered by the target, in tile pixel coordinates.
    pub area: PixelRect,
}

impl std::fmt::Debug for TileJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileJob")
            .field("pyramid", &self.pyramid.id())
            .field("mosaic", &self.mosaic.id())
            .field("coord", &self.coord)
            .field("area", &self.area)
            .finish()
    }
}

/// Summary of a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub mosaics: usize,
    pub tiles_written: usize,
    /// Destination pixels that received source data.
    pub pixels_resampled: usize,
}

/// Writes coverages into every pyramid of a tile store.
pub struct TileMatrixSetWriter {
    store: Arc<dyn TileStore>,
    transforms: Arc<dyn CoordinateTransformService>,
    resampler: Arc<dyn Resampler>,
    config: EngineConfig,
}

impl TileMatrixSetWriter {
    pub fn new(
        store: Arc<dyn TileStore>,
        transforms: Arc<dyn CoordinateTransformService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            transforms,
            resampler: Arc::new(GridResampler::new()),
            config,
        }
    }

    pub fn with_resampler(mut self, resampler: Arc<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }

    /// Tiles affected by writing `target` (in the CRS of `source`).
    ///
    /// Tiles whose covered area is empty are left out. The order of the
    /// returned jobs carries no meaning.
    pub fn plan(&self, source: &GridGeometry, target: &Envelope) -> Result<Vec<TileJob>> {
        let mut jobs = Vec::new();
        for pyramid in self.store.pyramids() {
            let bbox = self.to_pyramid_crs(source, pyramid.as_ref(), &target.bbox)?;
            let query = Envelope::new(pyramid.crs().clone(), bbox)
                .with_extra(target.extra.iter().copied());

            for mosaic in pyramid.mosaics() {
                let geometry = mosaic.geometry();
                if !mosaic_envelope(geometry, pyramid.crs()).intersects(&query) {
                    continue;
                }
                let Some(selection) = envelope_to_tile_range(geometry, &bbox) else {
                    continue;
                };
                for coord in selection.tiles.iter() {
                    let tile_rect = tile_pixel_rect(geometry, coord.x, coord.y);
                    let Some(covered) = tile_rect.intersection(&selection.pixels) else {
                        continue;
                    };
                    jobs.push(TileJob {
                        pyramid: Arc::clone(&pyramid),
                        mosaic: Arc::clone(&mosaic),
                        coord,
                        area: covered.relative_to(tile_rect.x, tile_rect.y),
                    });
                }
            }
        }

        debug!(store = %self.store.id(), jobs = jobs.len(), "Planned tile updates");
        Ok(jobs)
    }

    fn to_pyramid_crs(
        &self,
        source: &GridGeometry,
        pyramid: &dyn Pyramid,
        bbox: &BoundingBox,
    ) -> Result<BoundingBox> {
        if pyramid.crs().same_horizontal(&source.crs) {
            return Ok(*bbox);
        }
        Ok(self
            .transforms
            .transform_bbox(source.crs.code, pyramid.crs().code, bbox)?)
    }

    /// Resample `coverage` into every intersecting tile.
    ///
    /// `target` defaults to the coverage envelope and is clipped to it; a
    /// target outside the coverage writes nothing.
    pub async fn write(
        &self,
        coverage: &GridCoverage,
        target: Option<Envelope>,
        interpolation: InterpolationMethod,
    ) -> Result<WriteReport> {
        if self.store.capability() != StoreCapability::ReadWrite {
            return Err(PyramidError::ReadOnly(self.store.id().to_string()));
        }

        let source_geometry = &coverage.geometry;
        let coverage_envelope = coverage.envelope();
        let target = match target {
            None => coverage_envelope.clone(),
            Some(envelope) if envelope.crs.same_horizontal(&source_geometry.crs) => envelope,
            Some(envelope) => {
                let bbox = self.transforms.transform_bbox(
                    envelope.crs.code,
                    source_geometry.crs.code,
                    &envelope.bbox,
                )?;
                Envelope::new(source_geometry.crs.clone(), bbox)
                    .with_extra(envelope.extra.iter().copied())
            }
        };
        let Some(target) = target.intersection(&coverage_envelope) else {
            debug!(target = ?target.bbox, "Write target outside the coverage");
            return Ok(WriteReport::default());
        };

        let source_inverse = source_geometry.grid_to_world.inverse().ok_or_else(|| {
            PyramidError::invalid_geometry("coverage grid-to-world transform is singular")
        })?;
        let source = coverage.render().await?;
        let jobs = self.plan(source_geometry, &target)?;

        // Jobs grouped per mosaic, keeping first-seen order.
        let mut groups: Vec<Vec<TileJob>> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();
        for job in jobs {
            let key = (job.pyramid.id().to_string(), job.mosaic.id().to_string());
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(job);
        }

        // Tiles may be only partly covered; pixels off the source keep their values.
        let options = ResampleOptions::new(interpolation, coverage.fill_values(), self.config.border)
            .keep_uncovered();
        let mut report = WriteReport::default();
        for group in groups {
            let (written, pixels) = self
                .write_mosaic(group, source_geometry, &source_inverse, &source, &options)
                .await?;
            report.mosaics += 1;
            report.tiles_written += written;
            report.pixels_resampled += pixels;
        }

        info!(
            store = %self.store.id(),
            mosaics = report.mosaics,
            tiles = report.tiles_written,
            pixels = report.pixels_resampled,
            "Pyramid write complete"
        );
        Ok(report)
    }

    /// Update the tiles of one mosaic: fetch existing tiles in one batch,
    /// resample in parallel, write back in one batch.
    async fn write_mosaic(
        &self,
        jobs: Vec<TileJob>,
        source_geometry: &GridGeometry,
        source_inverse: &AffineTransform,
        source: &Arc<Raster>,
        options: &ResampleOptions,
    ) -> Result<(usize, usize)> {
        let Some(first) = jobs.first() else {
            return Ok((0, 0));
        };
        let pyramid = Arc::clone(&first.pyramid);
        let mosaic = Arc::clone(&first.mosaic);
        let geometry = mosaic.geometry().clone();

        let coords: Vec<TileCoord> = jobs
            .iter()
            .map(|job| job.coord)
            .filter(|c| !mosaic.is_missing(c.x, c.y))
            .collect();
        let stream = mosaic.get_tiles(coords).await?;
        let mut existing: HashMap<TileCoord, Arc<Raster>> = collect_tiles(
            stream,
            self.config.poll_interval(),
            self.config.max_idle_polls,
        )
        .await?
        .into_iter()
        .collect();

        let dimensions = self.store.sample_dimensions();
        let model = SampleModel::declared(&dimensions);
        let fill = band_fill(&dimensions, model.bands);

        let mut work = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let chain = TransformChain::new()
                .then_affine(tile_to_world(&geometry, job.coord.x, job.coord.y))
                .then_reproject(
                    Arc::clone(&self.transforms),
                    pyramid.crs().code,
                    source_geometry.crs.code,
                )?
                .then_affine(*source_inverse);
            let tile = match existing.remove(&job.coord) {
                Some(raster) => Arc::unwrap_or_clone(raster),
                None => Raster::filled(
                    geometry.tile_size.0,
                    geometry.tile_size.1,
                    model.bands,
                    model.sample_type,
                    &fill,
                ),
            };
            work.push((job.coord, job.area, tile, chain));
        }

        let resampler = Arc::clone(&self.resampler);
        let source = Arc::clone(source);
        let options = options.clone();
        let resampled: Vec<(Tile, usize)> = tokio::task::spawn_blocking(move || {
            work.into_par_iter()
                .map(|(coord, area, mut tile, chain)| {
                    let pixels = resampler.resample(&mut tile, area, &source, &chain, &options)?;
                    Ok((Tile::new(coord, tile), pixels))
                })
                .collect::<Result<Vec<_>>>()
        })
        .await??;

        let pixels = resampled.iter().map(|(_, n)| n).sum();
        let tiles: Vec<Tile> = resampled.into_iter().map(|(tile, _)| tile).collect();
        let written = tiles.len();
        mosaic.write_tiles(tiles).await?;

        debug!(
            pyramid = %pyramid.id(),
            mosaic = %mosaic.id(),
            tiles = written,
            pixels,
            "Mosaic tiles written"
        );
        Ok((written, pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTileStore, MosaicGeometry};
    use crate::types::{SampleDimension, SampleType};
    use projection::StandardTransforms;
    use pyramid_common::{Crs, CrsCode};
    use test_utils::create_test_grid;

    fn store() -> Arc<InMemoryTileStore> {
        let store = InMemoryTileStore::new(
            "s",
            vec![SampleDimension::new("v", SampleType::F32).with_no_data(-1.0)],
        );
        store
            .create_pyramid(
                "p",
                Crs::new(CrsCode::Epsg3857),
                vec![
                    MosaicGeometry::new("0", 2.0, (4, 4), (1, 1), vec![0.0, 0.0]),
                    MosaicGeometry::new("1", 1.0, (4, 4), (2, 2), vec![0.0, 0.0]),
                ],
            )
            .unwrap();
        Arc::new(store)
    }

    fn writer(store: Arc<InMemoryTileStore>) -> TileMatrixSetWriter {
        TileMatrixSetWriter::new(store, StandardTransforms::shared(), EngineConfig::default())
    }

    fn source(width: usize, height: usize, origin: (f64, f64)) -> GridCoverage {
        let geometry = GridGeometry::new(
            width,
            height,
            AffineTransform::north_up(origin.0, origin.1, 1.0),
            Crs::new(CrsCode::Epsg3857),
        );
        GridCoverage::new(
            geometry,
            vec![SampleDimension::new("v", SampleType::F32).with_no_data(-1.0)],
            Raster::from_f32(width, height, create_test_grid(width, height)).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_plan_covers_partial_tiles() {
        let w = writer(store());
        let cov = source(3, 3, (3.0, -3.0));
        let jobs = w.plan(&cov.geometry, &cov.envelope()).unwrap();

        // Finest level: pixels 3..6 span all four tiles
        let mut fine: Vec<_> = jobs
            .iter()
            .filter(|j| j.mosaic.id() == "1")
            .map(|j| (j.coord, j.area))
            .collect();
        fine.sort_by_key(|(c, _)| *c);
        assert_eq!(
            fine,
            vec![
                (TileCoord::new(0, 0), PixelRect::new(3, 3, 1, 1)),
                (TileCoord::new(0, 1), PixelRect::new(3, 0, 1, 2)),
                (TileCoord::new(1, 0), PixelRect::new(0, 3, 2, 1)),
                (TileCoord::new(1, 1), PixelRect::new(0, 0, 2, 2)),
            ]
        );
        assert_eq!(jobs.iter().filter(|j| j.mosaic.id() == "0").count(), 1);
    }

    #[tokio::test]
    async fn test_write_native_resolution() {
        let store = store();
        let w = writer(Arc::clone(&store));
        let cov = source(8, 8, (0.0, 0.0));
        let report = w.write(&cov, None, InterpolationMethod::Nearest).await.unwrap();

        assert_eq!(report.mosaics, 2);
        assert_eq!(report.tiles_written, 5);
        assert_eq!(report.pixels_resampled, 64 + 16);

        let fine = store.pyramid("p").unwrap().mosaic("1").unwrap();
        let tile = fine.get_tile(TileCoord::new(1, 1)).await.unwrap().unwrap();
        assert_eq!(tile.get(0, 0, 0), 4004.0);
        assert_eq!(tile.get(3, 2, 0), 7006.0);
    }

    #[tokio::test]
    async fn test_partial_write_keeps_existing_pixels() {
        let store = store();
        let fine = store.pyramid("p").unwrap().mosaic("1").unwrap();
        fine.put_tile(TileCoord::new(0, 0), Raster::filled(4, 4, 1, SampleType::F32, &[9.0]));

        let w = writer(Arc::clone(&store));
        let cov = source(2, 2, (2.0, -2.0));
        w.write(&cov, None, InterpolationMethod::Nearest).await.unwrap();

        let tile = fine.get_tile(TileCoord::new(0, 0)).await.unwrap().unwrap();
        assert_eq!(tile.get(0, 0, 0), 9.0);
        assert_eq!(tile.get(2, 2, 0), 0.0);
        assert_eq!(tile.get(3, 3, 0), 1001.0);
        assert_eq!(tile.get(1, 3, 0), 9.0);
    }

    fn constant_source(width: usize, height: usize, origin_x: f64, value: f32) -> GridCoverage {
        let geometry = GridGeometry::new(
            width,
            height,
            AffineTransform::north_up(origin_x, 0.0, 1.0),
            Crs::new(CrsCode::Epsg3857),
        );
        GridCoverage::new(
            geometry,
            vec![SampleDimension::new("v", SampleType::F32).with_no_data(-9999.0)],
            Raster::from_f32(width, height, vec![value; width * height]).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_adjacent_writes_into_coarse_level_keep_neighbour() {
        let store = Arc::new(InMemoryTileStore::new(
            "coarse",
            vec![SampleDimension::new("v", SampleType::F32).with_no_data(-9999.0)],
        ));
        store
            .create_pyramid(
                "p",
                Crs::new(CrsCode::Epsg3857),
                vec![MosaicGeometry::new("0", 2.0, (4, 4), (1, 1), vec![0.0, 0.0])],
            )
            .unwrap();
        let w = writer(Arc::clone(&store));
        let mosaic = store.pyramid("p").unwrap().mosaic("0").unwrap();

        // Right part first: x 3..8
        w.write(&constant_source(5, 8, 3.0, 2.0), None, InterpolationMethod::Nearest)
            .await
            .unwrap();
        let tile = mosaic.get_tile(TileCoord::new(0, 0)).await.unwrap().unwrap();
        let row: Vec<f64> = (0..4).map(|c| tile.get(c, 0, 0)).collect();
        assert_eq!(row, vec![-9999.0, 2.0, 2.0, 2.0]);

        // Left part: x 0..3 shares coarse pixel 1 (x 2..4) with the first write
        let report = w
            .write(&constant_source(3, 8, 0.0, 1.0), None, InterpolationMethod::Nearest)
            .await
            .unwrap();
        assert_eq!(report.pixels_resampled, 4);
        let tile = mosaic.get_tile(TileCoord::new(0, 0)).await.unwrap().unwrap();
        for r in 0..4 {
            let row: Vec<f64> = (0..4).map(|c| tile.get(c, r, 0)).collect();
            assert_eq!(row, vec![1.0, 2.0, 2.0, 2.0]);
        }
    }

    #[tokio::test]
    async fn test_target_outside_coverage_writes_nothing() {
        let store = store();
        let w = writer(Arc::clone(&store));
        let cov = source(2, 2, (0.0, 0.0));
        let target = Envelope::new(
            Crs::new(CrsCode::Epsg3857),
            BoundingBox::new(100.0, 100.0, 200.0, 200.0),
        );
        let report = w.write(&cov, Some(target), InterpolationMethod::Nearest).await.unwrap();
        assert_eq!(report, WriteReport::default());
        assert_eq!(store.tile_count(), 0);
    }

    #[tokio::test]
    async fn test_read_only_store_rejects_write() {
        let store = InMemoryTileStore::new("ro", Vec::new()).read_only();
        let w = TileMatrixSetWriter::new(
            Arc::new(store),
            StandardTransforms::shared(),
            EngineConfig::default(),
        );
        let cov = source(2, 2, (0.0, 0.0));
        let err = w.write(&cov, None, InterpolationMethod::Nearest).await.unwrap_err();
        assert!(matches!(err, PyramidError::ReadOnly(_)));
    }
}
