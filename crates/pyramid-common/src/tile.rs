//! Tile indices, tile ranges and pixel rectangles.

use serde::{Deserialize, Serialize};

/// Column/row index of a tile inside one mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Generate a cache/log key string.
    pub fn key(&self) -> String {
        format!("{}/{}", self.x, self.y)
    }
}

/// Half-open rectangle of tile indices: `min <= index < max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRange {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        coord.x >= self.min_x && coord.x < self.max_x && coord.y >= self.min_y && coord.y < self.max_y
    }

    /// Tiles in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> {
        let (min_x, max_x) = (self.min_x, self.max_x);
        (self.min_y..self.max_y).flat_map(move |y| (min_x..max_x).map(move |x| TileCoord::new(x, y)))
    }
}

/// Rectangle of pixels: origin plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

impl PixelRect {
    pub fn new(x: u64, y: u64, width: u64, height: u64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn max_x(&self) -> u64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> u64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        if x >= max_x || y >= max_y {
            return None;
        }
        Some(PixelRect::new(x, y, max_x - x, max_y - y))
    }

    /// Same rectangle expressed relative to `origin`.
    pub fn relative_to(&self, origin_x: u64, origin_y: u64) -> PixelRect {
        PixelRect::new(self.x - origin_x, self.y - origin_y, self.width, self.height)
    }
}
