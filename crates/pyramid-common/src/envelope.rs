//! N-dimensional envelopes: a horizontal bounding box plus one range per extra axis.

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, Crs};

/// A range of values along one extra axis.
///
/// Envelopes treat it as closed (`min <= v <= max`); coverage stacks treat
/// it as half-open (`min <= v < max`), see [`AxisRange::contains_half_open`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Degenerate range holding a single slice value.
    pub fn point(value: f64) -> Self {
        Self::new(value, value)
    }

    /// Range matching every value.
    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn contains_half_open(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }

    pub fn intersects(&self, other: &AxisRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    pub fn intersection(&self, other: &AxisRange) -> Option<AxisRange> {
        if !self.intersects(other) {
            return None;
        }
        Some(AxisRange::new(self.min.max(other.min), self.max.min(other.max)))
    }

    pub fn union(&self, other: &AxisRange) -> AxisRange {
        AxisRange::new(self.min.min(other.min), self.max.max(other.max))
    }
}

/// An envelope in a (possibly compound) CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub crs: Crs,
    pub bbox: BoundingBox,
    /// One range per extra axis of `crs`, in axis order.
    pub extra: Vec<AxisRange>,
}

impl Envelope {
    /// Envelope over `bbox`, unbounded along every extra axis of `crs`.
    pub fn new(crs: Crs, bbox: BoundingBox) -> Self {
        let extra = vec![AxisRange::unbounded(); crs.extra_axes.len()];
        Self { crs, bbox, extra }
    }

    /// Replace the extra-axis ranges. Missing trailing ranges stay unbounded,
    /// surplus ranges are ignored.
    pub fn with_extra(mut self, ranges: impl IntoIterator<Item = AxisRange>) -> Self {
        for (slot, range) in self.extra.iter_mut().zip(ranges) {
            *slot = range;
        }
        self
    }

    /// Restrict one extra axis to a range.
    pub fn with_axis_range(mut self, axis: usize, range: AxisRange) -> Self {
        if let Some(slot) = self.extra.get_mut(axis) {
            *slot = range;
        }
        self
    }

    pub fn dimension(&self) -> usize {
        2 + self.extra.len()
    }

    /// The horizontal part of this envelope as a 2-D envelope.
    pub fn horizontal(&self) -> Envelope {
        Envelope::new(self.crs.horizontal(), self.bbox)
    }

    /// Intersection test. Extra axes are compared pairwise up to the shorter
    /// of the two lists; axes only one side knows about do not constrain.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.bbox.intersects(&other.bbox)
            && self
                .extra
                .iter()
                .zip(&other.extra)
                .all(|(a, b)| a.intersects(b))
    }

    /// Intersection keeping this envelope's CRS.
    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        let bbox = self.bbox.intersection(&other.bbox)?;
        let mut extra = self.extra.clone();
        for (slot, b) in extra.iter_mut().zip(&other.extra) {
            *slot = slot.intersection(b)?;
        }
        Some(Envelope {
            crs: self.crs.clone(),
            bbox,
            extra,
        })
    }
}
