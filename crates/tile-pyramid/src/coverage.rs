//! Read and write payloads: grid coverages and coverage stacks.

use std::sync::Arc;

use pyramid_common::{AxisRange, Envelope, ExtraAxis, GridGeometry};

use crate::error::{PyramidError, Result};
use crate::image::MosaicImage;
use crate::types::{fill_values, Raster, SampleDimension};

/// Pixel data of a coverage.
#[derive(Debug, Clone)]
pub enum CoverageData {
    /// Fully assembled raster.
    Raster(Arc<Raster>),
    /// Lazily assembled view; tiles are fetched when rendered.
    Deferred(Arc<MosaicImage>),
}

/// A georeferenced raster with per-band metadata.
#[derive(Debug, Clone)]
pub struct GridCoverage {
    pub geometry: GridGeometry,
    pub sample_dimensions: Vec<SampleDimension>,
    pub data: CoverageData,
}

impl GridCoverage {
    /// Coverage over an assembled raster. The raster size must match the
    /// geometry.
    pub fn new(
        geometry: GridGeometry,
        sample_dimensions: Vec<SampleDimension>,
        raster: Raster,
    ) -> Result<Self> {
        if raster.width != geometry.width || raster.height != geometry.height {
            return Err(PyramidError::invalid_geometry(format!(
                "raster is {}x{}, geometry is {}x{}",
                raster.width, raster.height, geometry.width, geometry.height
            )));
        }
        Ok(Self {
            geometry,
            sample_dimensions,
            data: CoverageData::Raster(Arc::new(raster)),
        })
    }

    /// Coverage backed by a lazily assembled mosaic image.
    pub fn deferred(
        geometry: GridGeometry,
        sample_dimensions: Vec<SampleDimension>,
        image: Arc<MosaicImage>,
    ) -> Self {
        Self {
            geometry,
            sample_dimensions,
            data: CoverageData::Deferred(image),
        }
    }

    pub fn envelope(&self) -> Envelope {
        self.geometry.envelope()
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.data, CoverageData::Deferred(_))
    }

    /// The raster, when already assembled.
    pub fn raster(&self) -> Option<&Arc<Raster>> {
        match &self.data {
            CoverageData::Raster(raster) => Some(raster),
            CoverageData::Deferred(_) => None,
        }
    }

    /// Assembled pixel data, fetching tiles for deferred coverages.
    pub async fn render(&self) -> Result<Arc<Raster>> {
        match &self.data {
            CoverageData::Raster(raster) => Ok(Arc::clone(raster)),
            CoverageData::Deferred(image) => Ok(Arc::new(image.read_all().await?)),
        }
    }

    /// Per-band fill values from the sample dimensions.
    pub fn fill_values(&self) -> Vec<f64> {
        fill_values(&self.sample_dimensions)
    }
}

/// Result of a read: one coverage, or a stack of slices for cube data.
#[derive(Debug, Clone)]
pub enum ReadOutput {
    Coverage(GridCoverage),
    Stack(GridCoverageStack),
}

impl ReadOutput {
    pub fn as_coverage(&self) -> Option<&GridCoverage> {
        match self {
            Self::Coverage(coverage) => Some(coverage),
            Self::Stack(_) => None,
        }
    }

    pub fn into_coverage(self) -> Option<GridCoverage> {
        match self {
            Self::Coverage(coverage) => Some(coverage),
            Self::Stack(_) => None,
        }
    }

    pub fn as_stack(&self) -> Option<&GridCoverageStack> {
        match self {
            Self::Stack(stack) => Some(stack),
            Self::Coverage(_) => None,
        }
    }

    /// Every coverage held, depth first in slice order.
    pub fn coverages(&self) -> Vec<&GridCoverage> {
        match self {
            Self::Coverage(coverage) => vec![coverage],
            Self::Stack(stack) => stack.coverages(),
        }
    }
}

/// One slice of a [`GridCoverageStack`].
#[derive(Debug, Clone)]
pub struct StackSlice {
    /// Half-open range `[min, max)` along the stack axis.
    pub range: AxisRange,
    /// Slice ordinate the range was built around.
    pub value: f64,
    pub content: ReadOutput,
}

/// Coverages ordered along one extra axis.
#[derive(Debug, Clone)]
pub struct GridCoverageStack {
    /// Index of the stack axis among the CRS extra axes.
    pub axis_index: usize,
    pub axis: ExtraAxis,
    /// Slices in ascending order of `value`.
    pub slices: Vec<StackSlice>,
}

impl GridCoverageStack {
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Slice whose half-open range contains `value`.
    pub fn slice_at(&self, value: f64) -> Option<&StackSlice> {
        self.slices.iter().find(|s| s.range.contains_half_open(value))
    }

    pub fn values(&self) -> Vec<f64> {
        self.slices.iter().map(|s| s.value).collect()
    }

    pub fn ranges(&self) -> Vec<AxisRange> {
        self.slices.iter().map(|s| s.range).collect()
    }

    pub fn coverages(&self) -> Vec<&GridCoverage> {
        self.slices.iter().flat_map(|s| s.content.coverages()).collect()
    }
}
