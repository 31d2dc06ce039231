//! Region reads from a tile store.
//!
//! A read resolves the requested envelope against the store's nominal
//! geometry, picks a pyramid and a level, then either assembles one
//! mosaic into a coverage or, when several mosaics differ only by slice
//! ordinates, builds a stack of per-slice coverages.

mod cube;

pub use cube::{slice_ranges, SliceKey, SliceNode};

use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use projection::CoordinateTransformService;
use pyramid_common::{AxisRange, Envelope, GridGeometry, PixelRect, TileRange};

use crate::config::{EngineConfig, ReadMode};
use crate::coverage::{GridCoverage, GridCoverageStack, ReadOutput, StackSlice};
use crate::error::{PyramidError, Result};
use crate::image::{band_fill, MosaicImage, SampleModel};
use crate::region::{envelope_to_tile_range, mosaic_bbox, mosaic_grid_to_world, tile_to_world};
use crate::select::{select_mosaics, select_pyramid, TargetResolution};
use crate::store::{collect_tiles, Mosaic, Pyramid, TileStore};
use crate::types::{Raster, SampleDimension};

/// What to read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    /// Area and slices to read; the whole store when `None`.
    pub envelope: Option<Envelope>,
    /// Wanted pixel size along x and y, in units of the envelope CRS.
    pub resolution: Option<(f64, f64)>,
}

impl ReadRequest {
    /// Everything at the coarsest level.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope: Some(envelope),
            resolution: None,
        }
    }

    pub fn with_resolution(mut self, rx: f64, ry: f64) -> Self {
        self.resolution = Some((rx, ry));
        self
    }

    /// Request matching the extent and pixel size of `geometry`.
    pub fn from_grid(geometry: &GridGeometry) -> Self {
        Self {
            envelope: Some(geometry.envelope()),
            resolution: geometry.resolution(),
        }
    }
}

/// Reads coverages out of the pyramids of a tile store.
pub struct PyramidReader {
    store: Arc<dyn TileStore>,
    transforms: Arc<dyn CoordinateTransformService>,
    config: EngineConfig,
    nominal: OnceLock<GridGeometry>,
}

impl PyramidReader {
    pub fn new(
        store: Arc<dyn TileStore>,
        transforms: Arc<dyn CoordinateTransformService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            transforms,
            config,
            nominal: OnceLock::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TileStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_dimensions(&self) -> Vec<SampleDimension> {
        self.store.sample_dimensions()
    }

    /// Full extent of the store: the finest mosaic of the first pyramid
    /// (restricted to its data extent when declared), spanning every slice
    /// ordinate of that pyramid. Computed once.
    pub fn grid_geometry(&self) -> Result<GridGeometry> {
        if let Some(geometry) = self.nominal.get() {
            return Ok(geometry.clone());
        }
        let geometry = self.derive_geometry()?;
        Ok(self.nominal.get_or_init(|| geometry).clone())
    }

    fn derive_geometry(&self) -> Result<GridGeometry> {
        let pyramid = self
            .store
            .pyramids()
            .into_iter()
            .next()
            .ok_or(PyramidError::NoPyramid)?;
        let mosaics = pyramid.mosaics();
        let finest = mosaics
            .iter()
            .min_by(|a, b| a.geometry().scale.total_cmp(&b.geometry().scale))
            .ok_or_else(|| PyramidError::NoMosaic(pyramid.id().to_string()))?;

        let geometry = finest.geometry();
        let extent = geometry.data_extent.unwrap_or_else(|| {
            PixelRect::new(0, 0, geometry.pixel_width(), geometry.pixel_height())
        });
        let grid_to_world =
            mosaic_grid_to_world(geometry).offset_pixels(extent.x as f64, extent.y as f64);

        let axes = pyramid.crs().extra_axes.len();
        let mut slice: Vec<Option<AxisRange>> = vec![None; axes];
        for mosaic in &mosaics {
            for (slot, &value) in slice.iter_mut().zip(mosaic.geometry().slice_values()) {
                let point = AxisRange::point(value);
                *slot = Some(slot.map_or(point, |range| range.union(&point)));
            }
        }

        let nominal = GridGeometry::new(
            extent.width as usize,
            extent.height as usize,
            grid_to_world,
            pyramid.crs().clone(),
        )
        .with_slice(
            slice
                .into_iter()
                .map(|range| range.unwrap_or_else(AxisRange::unbounded))
                .collect(),
        );

        debug!(
            store = %self.store.id(),
            pyramid = %pyramid.id(),
            mosaic = %finest.id(),
            width = nominal.width,
            height = nominal.height,
            "Derived nominal grid geometry"
        );
        Ok(nominal)
    }

    /// Read the requested region.
    pub async fn read(&self, request: &ReadRequest) -> Result<ReadOutput> {
        let nominal = self.grid_geometry()?;
        let nominal_envelope = nominal.envelope();

        let requested = match &request.envelope {
            None => nominal_envelope,
            Some(envelope) if envelope.crs.same_horizontal(&nominal.crs) => envelope
                .intersection(&nominal_envelope)
                .ok_or_else(|| {
                    PyramidError::disjoint(format!(
                        "{:?} does not intersect the store extent {:?}",
                        envelope.bbox, nominal_envelope.bbox
                    ))
                })?,
            Some(envelope) => envelope.clone(),
        };

        let mut wanted = TargetResolution::from_resolution(request.resolution);

        let pyramid = select_pyramid(self.store.as_ref(), &requested.crs)?;
        let bbox = if pyramid.crs().same_horizontal(&requested.crs) {
            requested.bbox
        } else {
            let projected = self.transforms.transform_bbox(
                requested.crs.code,
                pyramid.crs().code,
                &requested.bbox,
            )?;
            wanted = wanted.scaled(
                projected.width() / requested.bbox.width(),
                projected.height() / requested.bbox.height(),
            );
            projected
        };
        let query = Envelope::new(pyramid.crs().clone(), bbox)
            .with_extra(requested.extra.iter().copied());

        let mosaics = select_mosaics(pyramid.as_ref(), wanted, &query, &self.config.selection)?;

        let output = match mosaics.as_slice() {
            [mosaic] => ReadOutput::Coverage(self.read_slice(pyramid.as_ref(), mosaic, &query).await?),
            _ => {
                let axes = pyramid.crs().extra_axes.len();
                let tree = SliceNode::build(&mosaics, axes)?;
                debug!(
                    pyramid = %pyramid.id(),
                    slices = tree.leaf_count(),
                    "Reading data cube"
                );
                self.read_node(pyramid.as_ref(), &tree, &query, Vec::new())
                    .await?
                    .ok_or_else(|| {
                        PyramidError::disjoint(format!(
                            "{:?} covers no tile of any slice of pyramid {}",
                            query.bbox,
                            pyramid.id()
                        ))
                    })?
            }
        };

        info!(
            store = %self.store.id(),
            pyramid = %pyramid.id(),
            coverages = output.coverages().len(),
            "Read complete"
        );
        Ok(output)
    }

    /// Read one mosaic over `query` (pyramid CRS).
    async fn read_slice(
        &self,
        pyramid: &dyn Pyramid,
        mosaic: &Arc<dyn Mosaic>,
        query: &Envelope,
    ) -> Result<GridCoverage> {
        let geometry = mosaic.geometry();
        let selection = envelope_to_tile_range(geometry, &query.bbox).ok_or_else(|| {
            PyramidError::disjoint(format!(
                "{:?} covers no tile of mosaic {} ({:?})",
                query.bbox,
                mosaic.id(),
                mosaic_bbox(geometry)
            ))
        })?;
        let tiles = selection.tiles;
        let (tw, th) = geometry.tile_size;
        let window = PixelRect::new(
            tiles.min_x as u64 * tw as u64,
            tiles.min_y as u64 * th as u64,
            tiles.width() as u64 * tw as u64,
            tiles.height() as u64 * th as u64,
        );

        let grid = GridGeometry::new(
            window.width as usize,
            window.height as usize,
            tile_to_world(geometry, tiles.min_x, tiles.min_y),
            pyramid.crs().clone(),
        )
        .with_slice(
            geometry
                .slice_values()
                .iter()
                .map(|&v| AxisRange::point(v))
                .collect(),
        );
        let dimensions = self.store.sample_dimensions();

        debug!(
            mosaic = %mosaic.id(),
            scale = geometry.scale,
            tiles = tiles.len(),
            mode = ?self.config.read_mode,
            "Reading mosaic region"
        );

        match self.config.read_mode {
            ReadMode::Eager => {
                let raster = self.assemble(mosaic, tiles, &dimensions).await?;
                GridCoverage::new(grid, dimensions, raster)
            }
            ReadMode::Deferred => {
                let image = MosaicImage::new(
                    Arc::clone(mosaic),
                    window,
                    dimensions.clone(),
                    &self.config.cache,
                )?;
                Ok(GridCoverage::deferred(grid, dimensions, Arc::new(image)))
            }
        }
    }

    /// Fetch every present tile of `tiles` in one batch and copy them into
    /// a single raster. Tiles may arrive in any order.
    async fn assemble(
        &self,
        mosaic: &Arc<dyn Mosaic>,
        tiles: TileRange,
        dimensions: &[SampleDimension],
    ) -> Result<Raster> {
        let (tw, th) = mosaic.geometry().tile_size;
        let coords: Vec<_> = tiles
            .iter()
            .filter(|c| !mosaic.is_missing(c.x, c.y))
            .collect();

        let stream = mosaic.get_tiles(coords).await?;
        let received = collect_tiles(
            stream,
            self.config.poll_interval(),
            self.config.max_idle_polls,
        )
        .await?;

        let model = received
            .iter()
            .fold(SampleModel::declared(dimensions), |model, (_, raster)| {
                model.widen_with(raster)
            });
        let fill = band_fill(dimensions, model.bands);
        let mut out = Raster::filled(
            tiles.width() as usize * tw,
            tiles.height() as usize * th,
            model.bands,
            model.sample_type,
            &fill,
        );

        for (coord, raster) in &received {
            if !tiles.contains(*coord) {
                continue;
            }
            let converted;
            let tile = if model.matches(raster) {
                raster.as_ref()
            } else {
                converted = raster.convert(model.sample_type, model.bands, &fill);
                &converted
            };
            out.copy_region(
                tile,
                PixelRect::new(0, 0, tile.width as u64, tile.height as u64),
                (coord.x - tiles.min_x) as usize * tw,
                (coord.y - tiles.min_y) as usize * th,
            );
        }

        debug!(
            mosaic = %mosaic.id(),
            requested = tiles.len(),
            received = received.len(),
            "Assembled tiles"
        );
        Ok(out)
    }

    /// Read one level of the slice tree. `path` holds the slice ranges of
    /// the enclosing levels. Leaves covering no tile of the query are
    /// dropped, and so are groups left without slices.
    fn read_node<'a>(
        &'a self,
        pyramid: &'a dyn Pyramid,
        node: &'a SliceNode,
        query: &'a Envelope,
        path: Vec<AxisRange>,
    ) -> BoxFuture<'a, Result<Option<ReadOutput>>> {
        async move {
            match node {
                SliceNode::Leaf(mosaic) => {
                    let mut coverage = match self.read_slice(pyramid, mosaic, query).await {
                        Ok(coverage) => coverage,
                        Err(err) if err.is_disjoint() => {
                            debug!(mosaic = %mosaic.id(), "Slice covers no tile of the query, skipped");
                            return Ok(None);
                        }
                        Err(err) => return Err(err),
                    };
                    for (slot, range) in coverage.geometry.slice.iter_mut().zip(&path) {
                        *slot = *range;
                    }
                    Ok(Some(ReadOutput::Coverage(coverage)))
                }
                SliceNode::Group(children) => {
                    let depth = path.len();
                    let axis = pyramid.crs().extra_axes.get(depth).cloned().ok_or_else(|| {
                        PyramidError::structure(format!("slice tree deeper than the CRS at {}", depth))
                    })?;
                    let values: Vec<f64> = children.keys().map(|k| k.0).collect();
                    let ranges = slice_ranges(&values);

                    let mut slices = Vec::with_capacity(children.len());
                    for ((key, child), range) in children.iter().zip(ranges) {
                        let mut child_path = path.clone();
                        child_path.push(range);
                        let content = self.read_node(pyramid, child, query, child_path).await?;
                        let Some(content) = content else {
                            continue;
                        };
                        slices.push(StackSlice {
                            range,
                            value: key.0,
                            content,
                        });
                    }
                    if slices.is_empty() {
                        return Ok(None);
                    }

                    Ok(Some(ReadOutput::Stack(GridCoverageStack {
                        axis_index: depth,
                        axis,
                        slices,
                    })))
                }
            }
        }
        .boxed()
    }
}
