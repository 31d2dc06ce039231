//! Pyramid and mosaic selection.

use std::sync::Arc;
use tracing::debug;

use pyramid_common::{Crs, Envelope};

use crate::config::{ResolutionFallback, SelectionConfig, TieBreak};
use crate::error::{PyramidError, Result};
use crate::region::mosaic_envelope;
use crate::store::{Mosaic, Pyramid, TileStore};

/// Relative difference under which two scales are the same level.
const SCALE_EPSILON: f64 = 1e-9;

/// Resolution a read asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetResolution {
    /// No usable resolution: take the coarsest level.
    Coarsest,
    /// World units per pixel along x and y.
    Exact([f64; 2]),
}

impl TargetResolution {
    /// `Coarsest` unless both components are finite and positive.
    pub fn from_resolution(resolution: Option<(f64, f64)>) -> Self {
        match resolution {
            Some((rx, ry)) if rx.is_finite() && ry.is_finite() && rx > 0.0 && ry > 0.0 => {
                Self::Exact([rx, ry])
            }
            _ => Self::Coarsest,
        }
    }

    /// Multiply both components by `factor` (used after reprojection).
    pub fn scaled(self, fx: f64, fy: f64) -> Self {
        match self {
            Self::Exact([rx, ry]) => Self::from_resolution(Some((rx * fx, ry * fy))),
            Self::Coarsest => Self::Coarsest,
        }
    }

    /// The finer of the two components.
    fn wanted(&self) -> Option<f64> {
        match self {
            Self::Exact([rx, ry]) => Some(rx.min(*ry)),
            Self::Coarsest => None,
        }
    }
}

fn same_scale(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCALE_EPSILON * a.abs().max(b.abs())
}

/// Pick the pyramid whose CRS best matches `target`.
///
/// Exact match first, then same horizontal CRS, then the first pyramid of
/// the store (the caller reprojects).
pub fn select_pyramid(store: &dyn TileStore, target: &Crs) -> Result<Arc<dyn Pyramid>> {
    let pyramids = store.pyramids();
    if let Some(p) = pyramids.iter().find(|p| p.crs() == target) {
        return Ok(Arc::clone(p));
    }
    if let Some(p) = pyramids.iter().find(|p| p.crs().same_horizontal(target)) {
        return Ok(Arc::clone(p));
    }
    pyramids.into_iter().next().ok_or(PyramidError::NoPyramid)
}

/// Pick the level to read for `wanted` and return every mosaic of that
/// level intersecting `envelope`.
///
/// `envelope` must be expressed in the pyramid CRS. Several mosaics are
/// returned when they share a scale but differ in slice ordinates.
pub fn select_mosaics(
    pyramid: &dyn Pyramid,
    wanted: TargetResolution,
    envelope: &Envelope,
    config: &SelectionConfig,
) -> Result<Vec<Arc<dyn Mosaic>>> {
    let all = pyramid.mosaics();
    if all.is_empty() {
        return Err(PyramidError::NoMosaic(pyramid.id().to_string()));
    }

    let candidates: Vec<Arc<dyn Mosaic>> = all
        .into_iter()
        .filter(|m| mosaic_envelope(m.geometry(), pyramid.crs()).intersects(envelope))
        .collect();
    if candidates.is_empty() {
        return Err(PyramidError::disjoint(format!(
            "no mosaic of pyramid {} intersects {:?}",
            pyramid.id(),
            envelope.bbox
        )));
    }

    let mut scales: Vec<f64> = candidates.iter().map(|m| m.geometry().scale).collect();
    scales.sort_by(f64::total_cmp);
    scales.dedup_by(|a, b| same_scale(*a, *b));

    let chosen = choose_scale(&scales, wanted, config);
    debug!(
        pyramid = %pyramid.id(),
        wanted = ?wanted,
        chosen_scale = chosen,
        levels = scales.len(),
        "Selected pyramid level"
    );

    Ok(candidates
        .into_iter()
        .filter(|m| same_scale(m.geometry().scale, chosen))
        .collect())
}

/// `scales` is sorted ascending and non-empty.
fn choose_scale(scales: &[f64], wanted: TargetResolution, config: &SelectionConfig) -> f64 {
    let finest = scales[0];
    let coarsest = scales[scales.len() - 1];

    let Some(target) = wanted.wanted() else {
        return coarsest;
    };

    let limit = target * (1.0 + config.tolerance);
    let mut best: Option<f64> = None;
    for &scale in scales.iter().filter(|&&s| s <= limit) {
        best = match best {
            None => Some(scale),
            Some(current) => {
                let d_new = (scale - target).abs();
                let d_cur = (current - target).abs();
                if d_new < d_cur {
                    Some(scale)
                } else if d_new == d_cur && config.tie_break == TieBreak::PreferCoarser {
                    // scales ascend, so `scale` is the coarser one
                    Some(scale)
                } else {
                    Some(current)
                }
            }
        };
    }

    best.unwrap_or(match config.fallback {
        ResolutionFallback::Coarsest => coarsest,
        ResolutionFallback::Finest => finest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryTileStore, MosaicGeometry};
    use crate::types::{SampleDimension, SampleType};
    use pyramid_common::{AxisRange, BoundingBox, CrsCode, ExtraAxis};

    fn three_level_store() -> InMemoryTileStore {
        let store = InMemoryTileStore::new("s", vec![SampleDimension::new("v", SampleType::F32)]);
        store
            .create_pyramid(
                "merc",
                Crs::new(CrsCode::Epsg3857),
                vec![
                    MosaicGeometry::new("0", 40.0, (256, 256), (1, 1), vec![0.0, 0.0]),
                    MosaicGeometry::new("1", 20.0, (256, 256), (2, 2), vec![0.0, 0.0]),
                    MosaicGeometry::new("2", 10.0, (256, 256), (4, 4), vec![0.0, 0.0]),
                ],
            )
            .unwrap();
        store
            .create_pyramid(
                "geo",
                Crs::new(CrsCode::Epsg4326),
                vec![MosaicGeometry::new("0", 1.0, (256, 256), (1, 1), vec![-180.0, 90.0])],
            )
            .unwrap();
        store
    }

    fn envelope(bbox: BoundingBox) -> Envelope {
        Envelope::new(Crs::new(CrsCode::Epsg3857), bbox)
    }

    fn select_ids(store: &InMemoryTileStore, wanted: TargetResolution, bbox: BoundingBox) -> Vec<String> {
        let pyramid = select_pyramid(store, &Crs::new(CrsCode::Epsg3857)).unwrap();
        select_mosaics(pyramid.as_ref(), wanted, &envelope(bbox), &SelectionConfig::default())
            .unwrap()
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    }

    #[test]
    fn test_select_pyramid_by_crs() {
        let store = three_level_store();
        let p = select_pyramid(&store, &Crs::new(CrsCode::Epsg4326)).unwrap();
        assert_eq!(p.id(), "geo");

        let compound = Crs::new(CrsCode::Epsg3857).with_axis(ExtraAxis::elevation());
        assert_eq!(select_pyramid(&store, &compound).unwrap().id(), "merc");

        assert_eq!(select_pyramid(&store, &Crs::new(CrsCode::Epsg3413)).unwrap().id(), "merc");
    }

    #[test]
    fn test_empty_store() {
        let store = InMemoryTileStore::new("empty", Vec::new());
        assert!(matches!(
            select_pyramid(&store, &Crs::new(CrsCode::Epsg3857)),
            Err(PyramidError::NoPyramid)
        ));
    }

    #[test]
    fn test_selects_closest_level() {
        let store = three_level_store();
        let bbox = BoundingBox::new(0.0, -1000.0, 1000.0, 0.0);
        assert_eq!(select_ids(&store, TargetResolution::Exact([10.0, 10.0]), bbox), vec!["2"]);
        assert_eq!(select_ids(&store, TargetResolution::Exact([21.0, 21.0]), bbox), vec!["1"]);
        assert_eq!(select_ids(&store, TargetResolution::Exact([35.0, 35.0]), bbox), vec!["1"]);
        assert_eq!(select_ids(&store, TargetResolution::Exact([100.0, 50.0]), bbox), vec!["0"]);
        assert_eq!(select_ids(&store, TargetResolution::Coarsest, bbox), vec!["0"]);
    }

    #[test]
    fn test_tolerance_admits_slightly_coarser_level() {
        let store = three_level_store();
        let bbox = BoundingBox::new(0.0, -1000.0, 1000.0, 0.0);
        // 20 <= 19 * 1.1, and 20 is closer to 19 than 10
        assert_eq!(select_ids(&store, TargetResolution::Exact([19.0, 19.0]), bbox), vec!["1"]);
    }

    #[test]
    fn test_too_fine_request_falls_back() {
        let store = three_level_store();
        let bbox = BoundingBox::new(0.0, -1000.0, 1000.0, 0.0);
        assert_eq!(select_ids(&store, TargetResolution::Exact([1.0, 1.0]), bbox), vec!["0"]);

        let pyramid = select_pyramid(&store, &Crs::new(CrsCode::Epsg3857)).unwrap();
        let config = SelectionConfig {
            fallback: ResolutionFallback::Finest,
            ..Default::default()
        };
        let finest = select_mosaics(
            pyramid.as_ref(),
            TargetResolution::Exact([1.0, 1.0]),
            &envelope(bbox),
            &config,
        )
        .unwrap();
        assert_eq!(finest[0].id(), "2");
    }

    #[test]
    fn test_tie_break() {
        let scales = [10.0, 20.0];
        let mut config = SelectionConfig {
            tolerance: 0.5,
            ..Default::default()
        };
        let wanted = TargetResolution::Exact([15.0, 15.0]);
        assert_eq!(choose_scale(&scales, wanted, &config), 10.0);
        config.tie_break = TieBreak::PreferCoarser;
        assert_eq!(choose_scale(&scales, wanted, &config), 20.0);
    }

    #[test]
    fn test_never_returns_disjoint_mosaic() {
        let store = InMemoryTileStore::new("s", Vec::new());
        store
            .create_pyramid(
                "p",
                Crs::new(CrsCode::Epsg3857),
                vec![
                    MosaicGeometry::new("west", 10.0, (256, 256), (1, 1), vec![0.0, 0.0]),
                    MosaicGeometry::new("east", 10.0, (256, 256), (1, 1), vec![10000.0, 0.0]),
                    MosaicGeometry::new("coarse", 40.0, (256, 256), (1, 1), vec![20000.0, 0.0]),
                ],
            )
            .unwrap();
        let bbox = BoundingBox::new(10500.0, -500.0, 11000.0, 0.0);
        for wanted in [
            TargetResolution::Coarsest,
            TargetResolution::Exact([10.0, 10.0]),
            TargetResolution::Exact([1.0, 1.0]),
        ] {
            assert_eq!(select_ids(&store, wanted, bbox), vec!["east"]);
        }

        let pyramid = select_pyramid(&store, &Crs::new(CrsCode::Epsg3857)).unwrap();
        let result = select_mosaics(
            pyramid.as_ref(),
            TargetResolution::Coarsest,
            &envelope(BoundingBox::new(-9000.0, 100.0, -8000.0, 200.0)),
            &SelectionConfig::default(),
        );
        assert!(matches!(result, Err(PyramidError::DisjointDomain(_))));
    }

    #[test]
    fn test_slice_filtering() {
        let crs = Crs::new(CrsCode::Epsg3857).with_axis(ExtraAxis::elevation());
        let store = InMemoryTileStore::new("s", Vec::new());
        store
            .create_pyramid(
                "p",
                crs.clone(),
                vec![
                    MosaicGeometry::new("e1", 10.0, (256, 256), (1, 1), vec![0.0, 0.0, 1.0]),
                    MosaicGeometry::new("e3", 10.0, (256, 256), (1, 1), vec![0.0, 0.0, 3.0]),
                    MosaicGeometry::new("e7", 10.0, (256, 256), (1, 1), vec![0.0, 0.0, 7.0]),
                ],
            )
            .unwrap();
        let pyramid = select_pyramid(&store, &crs).unwrap();
        let bbox = BoundingBox::new(0.0, -100.0, 100.0, 0.0);

        let all = Envelope::new(crs.clone(), bbox);
        let picked = select_mosaics(pyramid.as_ref(), TargetResolution::Coarsest, &all, &SelectionConfig::default())
            .unwrap();
        assert_eq!(picked.len(), 3);

        let one = Envelope::new(crs, bbox).with_extra([AxisRange::new(2.0, 4.0)]);
        let picked = select_mosaics(pyramid.as_ref(), TargetResolution::Coarsest, &one, &SelectionConfig::default())
            .unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id(), "e3");
    }

    #[test]
    fn test_target_resolution_from_resolution() {
        assert_eq!(TargetResolution::from_resolution(None), TargetResolution::Coarsest);
        assert_eq!(
            TargetResolution::from_resolution(Some((f64::NEG_INFINITY, 1.0))),
            TargetResolution::Coarsest
        );
        assert_eq!(
            TargetResolution::from_resolution(Some((2.0, 3.0))).scaled(2.0, 2.0),
            TargetResolution::Exact([4.0, 6.0])
        );
    }
}
