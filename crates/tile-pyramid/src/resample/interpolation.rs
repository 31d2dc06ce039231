//! Sample interpolation over one raster band.
//!
//! Positions are in centre-index space: `(0.0, 0.0)` is the centre of the
//! first pixel, so a corner-space coordinate `s` maps to `s - 0.5`.
//! Samples equal to the band's no-data value (or NaN) are treated as
//! holes: any hole among the contributing neighbours yields `None`.

use crate::config::BorderPolicy;
use crate::types::{same_sample, Raster};

/// Read access to one band with hole and border handling.
#[derive(Clone, Copy)]
pub struct BandSampler<'a> {
    raster: &'a Raster,
    band: usize,
    no_data: Option<f64>,
    border: BorderPolicy,
}

impl<'a> BandSampler<'a> {
    pub fn new(raster: &'a Raster, band: usize, no_data: Option<f64>, border: BorderPolicy) -> Self {
        Self {
            raster,
            band,
            no_data,
            border,
        }
    }

    /// Whether a centre-index position lies over the raster (including the
    /// outer half pixel).
    fn covers(&self, x: f64, y: f64) -> bool {
        x >= -0.5
            && y >= -0.5
            && x < self.raster.width as f64 - 0.5
            && y < self.raster.height as f64 - 0.5
    }

    /// Sample at integer position, clamped to the raster.
    fn at(&self, col: i64, row: i64) -> Option<f64> {
        let col = col.clamp(0, self.raster.width as i64 - 1) as usize;
        let row = row.clamp(0, self.raster.height as i64 - 1) as usize;
        let value = self.raster.get(col, row, self.band);
        if value.is_nan() || self.no_data.is_some_and(|nd| same_sample(value, nd)) {
            None
        } else {
            Some(value)
        }
    }

    /// Positions off the raster produce nothing under [`BorderPolicy::Fill`].
    fn accepts(&self, x: f64, y: f64) -> bool {
        if self.raster.width == 0 || self.raster.height == 0 {
            return false;
        }
        self.border == BorderPolicy::Extend || self.covers(x, y)
    }
}

/// Nearest neighbour: the pixel whose area contains the position.
pub fn nearest_interpolate(sampler: &BandSampler, x: f64, y: f64) -> Option<f64> {
    if !sampler.accepts(x, y) {
        return None;
    }
    let xi = (x + 0.5).floor() as i64;
    let yi = (y + 0.5).floor() as i64;
    sampler.at(xi, yi)
}

/// Bilinear interpolation between the four surrounding pixel centres.
pub fn bilinear_interpolate(sampler: &BandSampler, x: f64, y: f64) -> Option<f64> {
    if !sampler.accepts(x, y) {
        return None;
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let xf = x - x0;
    let yf = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let corners = [
        (x0, y0, (1.0 - xf) * (1.0 - yf)),
        (x0 + 1, y0, xf * (1.0 - yf)),
        (x0, y0 + 1, (1.0 - xf) * yf),
        (x0 + 1, y0 + 1, xf * yf),
    ];

    let mut sum = 0.0;
    for (col, row, weight) in corners {
        if weight == 0.0 {
            continue;
        }
        sum += sampler.at(col, row)? * weight;
    }
    Some(sum)
}

/// Bicubic (Catmull-Rom) interpolation over the surrounding 4x4 pixels.
///
/// Falls back to bilinear when any of the 16 samples is a hole.
pub fn cubic_interpolate(sampler: &BandSampler, x: f64, y: f64) -> Option<f64> {
    if !sampler.accepts(x, y) {
        return None;
    }
    let xi = x.floor() as i64;
    let yi = y.floor() as i64;
    let xf = x - xi as f64;
    let yf = y - yi as f64;

    let mut values = [[0.0f64; 4]; 4];
    for (j, row) in values.iter_mut().enumerate() {
        for (i, value) in row.iter_mut().enumerate() {
            match sampler.at(xi + i as i64 - 1, yi + j as i64 - 1) {
                Some(v) => *value = v,
                None => return bilinear_interpolate(sampler, x, y),
            }
        }
    }

    let mut row_values = [0.0f64; 4];
    for (out, row) in row_values.iter_mut().zip(&values) {
        *out = cubic_1d(row[0], row[1], row[2], row[3], xf);
    }
    Some(cubic_1d(
        row_values[0],
        row_values[1],
        row_values[2],
        row_values[3],
        yf,
    ))
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}
