//! Coordinate transform service and composable transform chains.

use std::fmt;
use std::sync::Arc;

use pyramid_common::{AffineTransform, BoundingBox, Crs, CrsCode, Envelope};

use crate::error::{TransformError, TransformResult};
use crate::mercator;

/// Number of sample points per edge when transforming a bounding box.
const EDGE_SAMPLES: usize = 21;

/// Maps points and regions between two horizontal CRS.
///
/// Implementations only need [`transform_point`](Self::transform_point);
/// region transforms densify the box edges so curved projections still
/// produce an enclosing box.
pub trait CoordinateTransformService: Send + Sync + fmt::Debug {
    fn transform_point(
        &self,
        from: CrsCode,
        to: CrsCode,
        x: f64,
        y: f64,
    ) -> TransformResult<(f64, f64)>;

    /// Whether a path between `from` and `to` exists.
    fn can_transform(&self, from: CrsCode, to: CrsCode) -> bool;

    fn transform_bbox(
        &self,
        from: CrsCode,
        to: CrsCode,
        bbox: &BoundingBox,
    ) -> TransformResult<BoundingBox> {
        if from == to {
            return Ok(*bbox);
        }

        let mut out = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        let steps = (EDGE_SAMPLES - 1) as f64;
        for i in 0..EDGE_SAMPLES {
            let t = i as f64 / steps;
            let x = bbox.min_x + t * bbox.width();
            let y = bbox.min_y + t * bbox.height();
            for (px, py) in [
                (x, bbox.min_y),
                (x, bbox.max_y),
                (bbox.min_x, y),
                (bbox.max_x, y),
            ] {
                let (tx, ty) = self.transform_point(from, to, px, py)?;
                out.min_x = out.min_x.min(tx);
                out.min_y = out.min_y.min(ty);
                out.max_x = out.max_x.max(tx);
                out.max_y = out.max_y.max(ty);
            }
        }
        Ok(out)
    }

    /// Transform the horizontal part of `envelope` into `target`.
    ///
    /// Extra-axis ranges are carried over position by position; they are not
    /// reprojected.
    fn transform_envelope(&self, envelope: &Envelope, target: &Crs) -> TransformResult<Envelope> {
        let bbox = self.transform_bbox(envelope.crs.code, target.code, &envelope.bbox)?;
        Ok(Envelope::new(target.clone(), bbox).with_extra(envelope.extra.iter().copied()))
    }
}

/// Built-in transforms between geographic CRS and Web Mercator.
///
/// EPSG:4326 and EPSG:4269 are treated as the same datum.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTransforms;

impl StandardTransforms {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> Arc<dyn CoordinateTransformService> {
        Arc::new(Self)
    }
}

impl CoordinateTransformService for StandardTransforms {
    fn transform_point(
        &self,
        from: CrsCode,
        to: CrsCode,
        x: f64,
        y: f64,
    ) -> TransformResult<(f64, f64)> {
        if from == to || (from.is_geographic() && to.is_geographic()) {
            return Ok((x, y));
        }
        match (from, to) {
            (f, CrsCode::Epsg3857) if f.is_geographic() => Ok(mercator::lonlat_to_mercator(x, y)),
            (CrsCode::Epsg3857, t) if t.is_geographic() => {
                if !x.is_finite() || !y.is_finite() {
                    return Err(TransformError::OutOfDomain { x, y, crs: from });
                }
                Ok(mercator::mercator_to_lonlat(x, y))
            }
            _ => Err(TransformError::NoPath { from, to }),
        }
    }

    fn can_transform(&self, from: CrsCode, to: CrsCode) -> bool {
        from == to
            || (from.is_geographic() && to.is_geographic())
            || (from.is_geographic() && to == CrsCode::Epsg3857)
            || (from == CrsCode::Epsg3857 && to.is_geographic())
    }
}

/// One step of a [`TransformChain`].
#[derive(Debug, Clone)]
pub enum TransformStep {
    Affine(AffineTransform),
    Reproject {
        service: Arc<dyn CoordinateTransformService>,
        from: CrsCode,
        to: CrsCode,
    },
}

/// An ordered sequence of point transforms, applied first to last.
///
/// Adjacent affine steps are folded into one as they are appended.
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    steps: Vec<TransformStep>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_affine(mut self, affine: AffineTransform) -> Self {
        if let Some(TransformStep::Affine(last)) = self.steps.last_mut() {
            *last = last.then(&affine);
        } else {
            self.steps.push(TransformStep::Affine(affine));
        }
        self
    }

    /// Append a reprojection; a no-op when `from == to`.
    pub fn then_reproject(
        mut self,
        service: Arc<dyn CoordinateTransformService>,
        from: CrsCode,
        to: CrsCode,
    ) -> TransformResult<Self> {
        if from == to {
            return Ok(self);
        }
        if !service.can_transform(from, to) {
            return Err(TransformError::NoPath { from, to });
        }
        self.steps.push(TransformStep::Reproject { service, from, to });
        Ok(self)
    }

    /// Append the inverse of `affine`.
    pub fn then_inverse_affine(self, affine: &AffineTransform) -> TransformResult<Self> {
        let inverse = affine
            .inverse()
            .ok_or_else(|| TransformError::NonInvertible(format!("{:?}", affine)))?;
        Ok(self.then_affine(inverse))
    }

    /// The whole chain as a single affine, when it contains no reprojection.
    pub fn as_affine(&self) -> Option<AffineTransform> {
        match self.steps.as_slice() {
            [] => Some(AffineTransform::identity()),
            [TransformStep::Affine(affine)] => Some(*affine),
            _ => None,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> TransformResult<(f64, f64)> {
        let mut point = (x, y);
        for step in &self.steps {
            point = match step {
                TransformStep::Affine(affine) => affine.apply(point.0, point.1),
                TransformStep::Reproject { service, from, to } => {
                    service.transform_point(*from, *to, point.0, point.1)?
                }
            };
        }
        Ok(point)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
