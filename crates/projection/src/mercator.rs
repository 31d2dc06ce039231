//! Spherical (Web) Mercator projection, EPSG:3857.
//!
//! Uses the WGS84 semi-major axis as the sphere radius, which is what the
//! tiled web map ecosystem expects.

use std::f64::consts::PI;

/// Sphere radius (meters), the WGS84 semi-major axis.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Half the width of the projected world (meters).
pub const MAX_EXTENT: f64 = PI * EARTH_RADIUS;

/// Latitude at which the projected square world is cut off (degrees).
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Project longitude/latitude (degrees) to Web Mercator meters.
///
/// Latitudes beyond [`MAX_LATITUDE`] are clamped so the poles map to the
/// edge of the square world instead of infinity.
pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Inverse of [`lonlat_to_mercator`].
pub fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}
