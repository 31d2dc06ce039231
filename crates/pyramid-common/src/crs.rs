//! Coordinate Reference System types and utilities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BoundingBox;

/// Well-known horizontal CRS codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
    /// NAD83 Geographic
    Epsg4269,
    /// Albers Equal Area (CONUS)
    Epsg5070,
    /// Polar Stereographic North
    Epsg3413,
    /// Polar Stereographic South
    Epsg3031,
}

impl CrsCode {
    /// Parse a CRS identifier.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "epsg:4326"
    /// - "CRS:84" (EPSG:4326 with lon/lat axis order)
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" => Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            "EPSG:4269" => Ok(CrsCode::Epsg4269),
            "EPSG:5070" => Ok(CrsCode::Epsg5070),
            "EPSG:3413" => Ok(CrsCode::Epsg3413),
            "EPSG:3031" => Ok(CrsCode::Epsg3031),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326 | CrsCode::Epsg4269)
    }

    /// Get the valid horizontal bounds for this CRS.
    pub fn valid_bounds(&self) -> BoundingBox {
        match self {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Epsg3857 => {
                // Web Mercator bounds (approx ±85.06° latitude)
                let max_extent = 20037508.342789244;
                BoundingBox::new(-max_extent, -max_extent, max_extent, max_extent)
            }
            CrsCode::Epsg5070 => BoundingBox::new(-2500000.0, -2500000.0, 2500000.0, 2500000.0),
            CrsCode::Epsg3413 | CrsCode::Epsg3031 => {
                BoundingBox::new(-4000000.0, -4000000.0, 4000000.0, 4000000.0)
            }
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Epsg4326 => "EPSG:4326",
            CrsCode::Epsg3857 => "EPSG:3857",
            CrsCode::Epsg4269 => "EPSG:4269",
            CrsCode::Epsg5070 => "EPSG:5070",
            CrsCode::Epsg3413 => "EPSG:3413",
            CrsCode::Epsg3031 => "EPSG:3031",
        };
        write!(f, "{}", code)
    }
}

/// Kind of a non-horizontal axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Elevation,
    Time,
    Other,
}

/// A non-horizontal axis appended to a horizontal CRS (elevation, time, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtraAxis {
    pub name: String,
    pub kind: AxisKind,
    /// Unit label, e.g. "m" or "days since 2024-01-01".
    pub unit: String,
}

impl ExtraAxis {
    pub fn new(name: impl Into<String>, kind: AxisKind, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            unit: unit.into(),
        }
    }

    pub fn elevation() -> Self {
        Self::new("elevation", AxisKind::Elevation, "m")
    }

    pub fn time(unit: impl Into<String>) -> Self {
        Self::new("time", AxisKind::Time, unit)
    }
}

/// A horizontal CRS optionally compounded with extra slice axes.
///
/// Ordinates are always ordered as `[x, y, extra_0, extra_1, ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub code: CrsCode,
    #[serde(default)]
    pub extra_axes: Vec<ExtraAxis>,
}

impl Crs {
    pub fn new(code: CrsCode) -> Self {
        Self {
            code,
            extra_axes: Vec::new(),
        }
    }

    /// Append an extra axis, returning the compound CRS.
    pub fn with_axis(mut self, axis: ExtraAxis) -> Self {
        self.extra_axes.push(axis);
        self
    }

    /// Total number of dimensions (2 + extra axes).
    pub fn dimension(&self) -> usize {
        2 + self.extra_axes.len()
    }

    /// The 2-D horizontal component.
    pub fn horizontal(&self) -> Crs {
        Crs::new(self.code)
    }

    pub fn same_horizontal(&self, other: &Crs) -> bool {
        self.code == other.code
    }
}

impl From<CrsCode> for Crs {
    fn from(code: CrsCode) -> Self {
        Crs::new(code)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        for axis in &self.extra_axes {
            write!(f, "+{}", axis.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}
