//! Configuration for the tile pyramid engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::InterpolationMethod;

/// How mosaics are picked when several levels satisfy a resolution equally well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Pick the smaller scale (more detail).
    #[default]
    PreferFiner,
    /// Pick the larger scale (fewer tiles).
    PreferCoarser,
}

/// Level used when no mosaic is fine enough for the requested resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFallback {
    /// Return the coarsest level.
    #[default]
    Coarsest,
    /// Return the finest level.
    Finest,
}

/// Whether single-slice reads assemble pixels immediately or on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Fetch every tile of the range and build one raster.
    #[default]
    Eager,
    /// Wrap the range in a lazily loaded mosaic image.
    Deferred,
}

/// Behaviour for destination pixels whose interpolation footprint leaves
/// the source raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderPolicy {
    /// Leave the pixel at the fill value.
    #[default]
    Fill,
    /// Clamp the footprint to the nearest edge pixels.
    Extend,
}

/// Mosaic selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Relative tolerance: a level of scale `s` satisfies resolution `r`
    /// when `s <= r * (1 + tolerance)`.
    pub tolerance: f64,
    pub tie_break: TieBreak,
    pub fallback: ResolutionFallback,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.1,
            tie_break: TieBreak::PreferFiner,
            fallback: ResolutionFallback::Coarsest,
        }
    }
}

/// Mosaic image tile cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileCacheConfig {
    /// Entries kept after an eviction round.
    pub capacity: usize,
    /// Entry count that triggers eviction.
    pub soft_limit: usize,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            soft_limit: 12,
        }
    }
}

/// Configuration for readers and writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub selection: SelectionConfig,
    pub cache: TileCacheConfig,
    pub read_mode: ReadMode,

    /// Wait per poll of a batch tile fetch, in milliseconds.
    pub poll_interval_ms: u64,

    /// Consecutive empty polls after which a batch fetch is abandoned.
    pub max_idle_polls: u32,

    /// Interpolation used by tile generation.
    pub interpolation: InterpolationMethod,

    pub border: BorderPolicy,

    /// Tiles generated concurrently by `TileGenerator::generate_all`.
    pub write_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            cache: TileCacheConfig::default(),
            read_mode: ReadMode::Eager,
            poll_interval_ms: 100,
            max_idle_polls: 600,
            interpolation: InterpolationMethod::Bilinear,
            border: BorderPolicy::Fill,
            write_concurrency: 4,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PYRAMID_SELECTION_TOLERANCE") {
            if let Ok(tolerance) = val.parse() {
                config.selection.tolerance = tolerance;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_TIE_BREAK") {
            config.selection.tie_break = match val.to_lowercase().as_str() {
                "coarser" | "prefer_coarser" => TieBreak::PreferCoarser,
                _ => TieBreak::PreferFiner,
            };
        }

        if let Ok(val) = std::env::var("PYRAMID_RESOLUTION_FALLBACK") {
            config.selection.fallback = match val.to_lowercase().as_str() {
                "finest" => ResolutionFallback::Finest,
                _ => ResolutionFallback::Coarsest,
            };
        }

        if let Ok(val) = std::env::var("PYRAMID_CACHE_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                config.cache.capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_CACHE_SOFT_LIMIT") {
            if let Ok(limit) = val.parse() {
                config.cache.soft_limit = limit;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_READ_MODE") {
            config.read_mode = match val.to_lowercase().as_str() {
                "deferred" | "lazy" => ReadMode::Deferred,
                _ => ReadMode::Eager,
            };
        }

        if let Ok(val) = std::env::var("PYRAMID_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.poll_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_MAX_IDLE_POLLS") {
            if let Ok(polls) = val.parse() {
                config.max_idle_polls = polls;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_INTERPOLATION") {
            config.interpolation = InterpolationMethod::from_str(&val);
        }

        if let Ok(val) = std::env::var("PYRAMID_BORDER") {
            config.border = match val.to_lowercase().as_str() {
                "extend" | "clamp" => BorderPolicy::Extend,
                _ => BorderPolicy::Fill,
            };
        }

        if let Ok(val) = std::env::var("PYRAMID_WRITE_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                config.write_concurrency = n;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.selection.tolerance.is_finite() || self.selection.tolerance < 0.0 {
            return Err("selection tolerance must be a finite value >= 0".to_string());
        }

        if self.cache.capacity == 0 {
            return Err("cache capacity must be > 0".to_string());
        }

        if self.cache.soft_limit < self.cache.capacity {
            return Err("cache soft_limit must be >= capacity".to_string());
        }

        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be > 0".to_string());
        }

        if self.max_idle_polls == 0 {
            return Err("max_idle_polls must be > 0".to_string());
        }

        if self.write_concurrency == 0 {
            return Err("write_concurrency must be > 0".to_string());
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ============================================================================
// Pyramid Layout Configuration
// ============================================================================

/// Configuration for laying out the levels of a new pyramid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Tile width and height in pixels.
    pub tile_size: usize,

    /// Stop adding levels once the smaller pixel dimension of a level
    /// falls below this value.
    pub min_dimension: usize,

    /// Scale factor between consecutive levels (typically 2).
    pub downscale_factor: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            min_dimension: 256,
            downscale_factor: 2,
        }
    }
}

impl LayoutConfig {
    /// Load layout configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PYRAMID_TILE_SIZE") {
            if let Ok(size) = val.parse() {
                config.tile_size = size;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_MIN_DIMENSION") {
            if let Ok(size) = val.parse() {
                config.min_dimension = size;
            }
        }

        if let Ok(val) = std::env::var("PYRAMID_DOWNSCALE_FACTOR") {
            if let Ok(factor) = val.parse() {
                config.downscale_factor = factor;
            }
        }

        config
    }

    /// Validate the layout configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("layout tile_size must be > 0".to_string());
        }

        if self.min_dimension == 0 {
            return Err("layout min_dimension must be > 0".to_string());
        }

        if self.downscale_factor < 2 {
            return Err("layout downscale_factor must be >= 2".to_string());
        }

        Ok(())
    }

    /// Calculate how many levels a pyramid over a `width` x `height` pixel
    /// base grid has, including level 0.
    pub fn calculate_num_levels(&self, width: usize, height: usize) -> usize {
        let mut levels = 1;
        let mut w = width;
        let mut h = height;

        loop {
            w /= self.downscale_factor;
            h /= self.downscale_factor;
            if w.min(h) < self.min_dimension || w == 0 || h == 0 {
                break;
            }
            levels += 1;
        }

        levels
    }
}
