//! Common test fixtures for pyramid tests.
//!
//! Extents and level parameters that recur across the test suite. Values
//! are plain tuples so this crate stays free of workspace dependencies.

/// Common bounding boxes as (min_x, min_y, max_x, max_y).
pub mod bbox {
    /// Global geographic extent (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Full Web Mercator square (meters)
    pub const WEB_MERCATOR: (f64, f64, f64, f64) = (
        -20037508.342789244,
        -20037508.342789244,
        20037508.342789244,
        20037508.342789244,
    );

    /// Continental United States bounding box
    pub const CONUS: (f64, f64, f64, f64) = (-130.0, 20.0, -60.0, 55.0);

    /// Extent of a 2x2-tile, 256 px, scale-10 mosaic anchored at (0, 0)
    pub const SMALL_MOSAIC: (f64, f64, f64, f64) = (0.0, -5120.0, 5120.0, 0.0);
}

/// Pyramid level parameters.
pub mod levels {
    /// Standard tile size in pixels
    pub const TILE_SIZE: usize = 256;

    /// Web Mercator scale (meters per pixel) at zoom 0 with 256 px tiles
    pub const WEB_MERCATOR_ZOOM0_SCALE: f64 = 156543.03392804097;

    /// Scale of each zoom level for the first few Web Mercator levels
    pub fn web_mercator_scale(zoom: u32) -> f64 {
        WEB_MERCATOR_ZOOM0_SCALE / 2f64.powi(zoom as i32)
    }
}

/// Slice ordinates used by cube tests.
pub mod slices {
    /// Irregularly spaced elevations
    pub const ELEVATIONS: [f64; 3] = [1.0, 3.0, 7.0];

    /// Daily time steps (days since epoch)
    pub const DAYS: [f64; 2] = [0.0, 1.0];
}
