//! Resampling of a source raster into a destination raster area.
//!
//! The caller supplies a transform from destination pixel-corner space to
//! source pixel-corner space. Each destination pixel centre is mapped
//! through it and the source is interpolated there.

pub mod interpolation;

pub use interpolation::{bilinear_interpolate, cubic_interpolate, nearest_interpolate, BandSampler};

use projection::{TransformChain, TransformError};
use pyramid_common::PixelRect;

use crate::config::BorderPolicy;
use crate::error::{PyramidError, Result};
use crate::types::{InterpolationMethod, Raster};

/// Parameters shared by every resample call of one operation.
#[derive(Debug, Clone)]
pub struct ResampleOptions {
    pub interpolation: InterpolationMethod,
    /// Per-band value written where the source has no data. Source samples
    /// equal to these values are treated as holes.
    pub fill: Vec<f64>,
    pub border: BorderPolicy,
    /// Leave destination pixels whose centre maps off the source untouched
    /// instead of writing the fill value.
    pub keep_uncovered: bool,
}

impl ResampleOptions {
    pub fn new(interpolation: InterpolationMethod, fill: Vec<f64>, border: BorderPolicy) -> Self {
        Self {
            interpolation,
            fill,
            border,
            keep_uncovered: false,
        }
    }

    pub fn keep_uncovered(mut self) -> Self {
        self.keep_uncovered = true;
        self
    }

    fn fill_for(&self, band: usize) -> f64 {
        self.fill.get(band).copied().unwrap_or(0.0)
    }
}

/// Fills part of a destination raster from a source raster.
pub trait Resampler: Send + Sync {
    /// Resample `source` into `area` of `dest` (destination pixel
    /// coordinates). `to_source` maps destination pixel-corner coordinates
    /// to source pixel-corner coordinates.
    ///
    /// Returns the number of destination pixels that received source data.
    fn resample(
        &self,
        dest: &mut Raster,
        area: PixelRect,
        source: &Raster,
        to_source: &TransformChain,
        options: &ResampleOptions,
    ) -> Result<usize>;
}

/// Point-sampling resampler using the interpolation kernels of
/// [`interpolation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GridResampler;

impl GridResampler {
    pub fn new() -> Self {
        Self
    }
}

impl Resampler for GridResampler {
    fn resample(
        &self,
        dest: &mut Raster,
        area: PixelRect,
        source: &Raster,
        to_source: &TransformChain,
        options: &ResampleOptions,
    ) -> Result<usize> {
        let bounds = PixelRect::new(0, 0, dest.width as u64, dest.height as u64);
        let Some(area) = bounds.intersection(&area) else {
            return Ok(0);
        };

        let affine = to_source.as_affine();
        let integral = !dest.sample_type().is_float();
        let shared = dest.bands.min(source.bands);
        let samplers: Vec<BandSampler> = (0..shared)
            .map(|band| {
                BandSampler::new(source, band, Some(options.fill_for(band)), options.border)
            })
            .collect();

        let mut written = 0;
        for row in area.y as usize..area.max_y() as usize {
            for col in area.x as usize..area.max_x() as usize {
                let (cx, cy) = (col as f64 + 0.5, row as f64 + 0.5);
                let mapped = match &affine {
                    Some(a) => Ok(a.apply(cx, cy)),
                    None => to_source.apply(cx, cy),
                };
                let (sx, sy) = match mapped {
                    Ok(point) => point,
                    Err(TransformError::OutOfDomain { .. }) => (f64::NAN, f64::NAN),
                    Err(err) => return Err(PyramidError::Transform(err)),
                };
                if options.keep_uncovered && !source.covers_corner(sx, sy) {
                    continue;
                }

                let mut any = false;
                for band in 0..dest.bands {
                    let value = samplers.get(band).and_then(|sampler| {
                        if !(sx.is_finite() && sy.is_finite()) {
                            return None;
                        }
                        let (x, y) = (sx - 0.5, sy - 0.5);
                        match options.interpolation {
                            InterpolationMethod::Nearest => nearest_interpolate(sampler, x, y),
                            InterpolationMethod::Bilinear => bilinear_interpolate(sampler, x, y),
                            InterpolationMethod::Cubic => cubic_interpolate(sampler, x, y),
                        }
                    });
                    let value = match value {
                        Some(v) => {
                            any = true;
                            if integral {
                                v.round()
                            } else {
                                v
                            }
                        }
                        None => options.fill_for(band),
                    };
                    dest.set(col, row, band, value);
                }
                if any {
                    written += 1;
                }
            }
        }

        Ok(written)
    }
}
