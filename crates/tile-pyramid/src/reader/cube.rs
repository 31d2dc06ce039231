//! Grouping of same-resolution mosaics into a slice tree.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use pyramid_common::AxisRange;

use crate::error::{PyramidError, Result};
use crate::store::Mosaic;

/// Slice ordinate used as an ordered map key.
#[derive(Debug, Clone, Copy)]
pub struct SliceKey(pub f64);

impl PartialEq for SliceKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SliceKey {}

impl PartialOrd for SliceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SliceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Mosaics arranged by slice ordinate, one tree level per extra axis
/// (first extra axis at the root).
pub enum SliceNode {
    Leaf(Arc<dyn Mosaic>),
    Group(BTreeMap<SliceKey, SliceNode>),
}

impl std::fmt::Debug for SliceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf(mosaic) => f.debug_tuple("Leaf").field(&mosaic.id()).finish(),
            Self::Group(children) => f.debug_map().entries(children.iter().map(|(k, v)| (k.0, v))).finish(),
        }
    }
}

impl SliceNode {
    /// Build the tree for mosaics carrying `axes` slice ordinates each.
    pub fn build(mosaics: &[Arc<dyn Mosaic>], axes: usize) -> Result<SliceNode> {
        if axes == 0 {
            return match mosaics {
                [single] => Ok(SliceNode::Leaf(Arc::clone(single))),
                _ => Err(PyramidError::structure(format!(
                    "{} mosaics share one resolution but the CRS has no extra axis",
                    mosaics.len()
                ))),
            };
        }
        Self::group(mosaics, 0, axes)
    }

    fn group(mosaics: &[Arc<dyn Mosaic>], depth: usize, axes: usize) -> Result<SliceNode> {
        let mut buckets: BTreeMap<SliceKey, Vec<Arc<dyn Mosaic>>> = BTreeMap::new();
        for mosaic in mosaics {
            let value = mosaic
                .geometry()
                .slice_values()
                .get(depth)
                .copied()
                .ok_or_else(|| {
                    PyramidError::structure(format!(
                        "mosaic {} has no ordinate for extra axis {}",
                        mosaic.id(),
                        depth
                    ))
                })?;
            buckets.entry(SliceKey(value)).or_default().push(Arc::clone(mosaic));
        }

        let mut children = BTreeMap::new();
        for (key, bucket) in buckets {
            let child = if depth + 1 == axes {
                match bucket.as_slice() {
                    [single] => SliceNode::Leaf(Arc::clone(single)),
                    _ => {
                        return Err(PyramidError::structure(format!(
                            "{} mosaics at slice {} of axis {}",
                            bucket.len(),
                            key.0,
                            depth
                        )))
                    }
                }
            } else {
                Self::group(&bucket, depth + 1, axes)?
            };
            children.insert(key, child);
        }
        Ok(SliceNode::Group(children))
    }

    /// Number of leaves below this node.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Group(children) => children.values().map(SliceNode::leaf_count).sum(),
        }
    }
}

/// Half-open ranges around sorted slice values.
///
/// Interior bounds are midpoints between neighbours. The first slice
/// reaches one full step below its value, the last half a step above;
/// a lone slice gets `[v - 0.5, v + 0.5)`.
pub fn slice_ranges(values: &[f64]) -> Vec<AxisRange> {
    match values {
        [] => Vec::new(),
        [v] => vec![AxisRange::new(v - 0.5, v + 0.5)],
        _ => {
            let n = values.len();
            (0..n)
                .map(|i| {
                    let min = if i == 0 {
                        values[0] - (values[1] - values[0])
                    } else {
                        (values[i - 1] + values[i]) / 2.0
                    };
                    let max = if i + 1 == n {
                        values[n - 1] + (values[n - 1] - values[n - 2]) / 2.0
                    } else {
                        (values[i] + values[i + 1]) / 2.0
                    };
                    AxisRange::new(min, max)
                })
                .collect()
        }
    }
}
