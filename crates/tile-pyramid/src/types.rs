//! Core raster types for the tile pyramid engine.

use serde::{Deserialize, Serialize};

use pyramid_common::PixelRect;

use crate::error::{PyramidError, Result};

/// Pixel data type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    I16,
    U16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Parse from string (case-insensitive). Unknown names map to `F32`.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "u8" | "byte" => Self::U8,
            "i16" | "short" => Self::I16,
            "u16" | "ushort" => Self::U16,
            "i32" | "int" => Self::I32,
            "f64" | "double" => Self::F64,
            _ => Self::F32,
        }
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Smallest type that holds every value of both `self` and `other`.
    pub fn widen(self, other: SampleType) -> SampleType {
        use SampleType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (F64, _) | (_, F64) => F64,
            (F32, I32) | (I32, F32) => F64,
            (F32, _) | (_, F32) => F32,
            (I32, _) | (_, I32) => I32,
            (I16, U16) | (U16, I16) => I32,
            (I16, U8) | (U8, I16) => I16,
            (U16, U8) | (U8, U16) => U16,
            (a, _) => a,
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        };
        write!(f, "{}", name)
    }
}

/// Typed sample storage of a [`Raster`].
#[derive(Debug, Clone, PartialEq)]
pub enum RasterBuffer {
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_buffer {
    ($buffer:expr, $data:ident => $body:expr) => {
        match $buffer {
            RasterBuffer::U8($data) => $body,
            RasterBuffer::I16($data) => $body,
            RasterBuffer::U16($data) => $body,
            RasterBuffer::I32($data) => $body,
            RasterBuffer::F32($data) => $body,
            RasterBuffer::F64($data) => $body,
        }
    };
}

impl RasterBuffer {
    /// Buffer of `len` samples all set to `value` (cast to the sample type).
    pub fn filled(sample_type: SampleType, len: usize, value: f64) -> Self {
        match sample_type {
            SampleType::U8 => Self::U8(vec![value as u8; len]),
            SampleType::I16 => Self::I16(vec![value as i16; len]),
            SampleType::U16 => Self::U16(vec![value as u16; len]),
            SampleType::I32 => Self::I32(vec![value as i32; len]),
            SampleType::F32 => Self::F32(vec![value as f32; len]),
            SampleType::F64 => Self::F64(vec![value; len]),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Self::U8(_) => SampleType::U8,
            Self::I16(_) => SampleType::I16,
            Self::U16(_) => SampleType::U16,
            Self::I32(_) => SampleType::I32,
            Self::F32(_) => SampleType::F32,
            Self::F64(_) => SampleType::F64,
        }
    }

    pub fn len(&self) -> usize {
        each_buffer!(self, data => data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        each_buffer!(self, data => data[index] as f64)
    }

    /// Store `value`, cast to the sample type. Integer casts saturate and
    /// NaN becomes 0.
    #[inline]
    pub fn set(&mut self, index: usize, value: f64) {
        match self {
            Self::U8(data) => data[index] = value as u8,
            Self::I16(data) => data[index] = value as i16,
            Self::U16(data) => data[index] = value as u16,
            Self::I32(data) => data[index] = value as i32,
            Self::F32(data) => data[index] = value as f32,
            Self::F64(data) => data[index] = value,
        }
    }
}

/// A pixel-interleaved raster: sample `(col, row, band)` lives at
/// `(row * width + col) * bands + band`.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub buffer: RasterBuffer,
}

impl Raster {
    pub fn new(width: usize, height: usize, bands: usize, buffer: RasterBuffer) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(bands))
            .ok_or_else(|| {
                PyramidError::invalid_geometry(format!(
                    "raster {}x{}x{} overflows the addressable sample count",
                    width, height, bands
                ))
            })?;
        if buffer.len() != expected {
            return Err(PyramidError::invalid_geometry(format!(
                "raster {}x{}x{} needs {} samples, buffer has {}",
                width,
                height,
                bands,
                expected,
                buffer.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bands,
            buffer,
        })
    }

    /// Single-band `f32` raster from row-major data.
    pub fn from_f32(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        Self::new(width, height, 1, RasterBuffer::F32(data))
    }

    /// Raster with every band set to its fill value. Missing fill entries are 0.
    pub fn filled(
        width: usize,
        height: usize,
        bands: usize,
        sample_type: SampleType,
        fill: &[f64],
    ) -> Self {
        let first = fill.first().copied().unwrap_or(0.0);
        let mut buffer = RasterBuffer::filled(sample_type, width * height * bands, first);
        let uniform = (0..bands).all(|b| fill.get(b).copied().unwrap_or(0.0).to_bits() == first.to_bits());
        if !uniform {
            for pixel in 0..width * height {
                for band in 0..bands {
                    buffer.set(pixel * bands + band, fill.get(band).copied().unwrap_or(0.0));
                }
            }
        }
        Self {
            width,
            height,
            bands,
            buffer,
        }
    }

    pub fn sample_type(&self) -> SampleType {
        self.buffer.sample_type()
    }

    #[inline]
    pub fn index(&self, col: usize, row: usize, band: usize) -> usize {
        (row * self.width + col) * self.bands + band
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize, band: usize) -> f64 {
        self.buffer.get(self.index(col, row, band))
    }

    #[inline]
    pub fn set(&mut self, col: usize, row: usize, band: usize, value: f64) {
        let index = self.index(col, row, band);
        self.buffer.set(index, value);
    }

    /// Whether a pixel-corner position lies on the raster.
    pub fn covers_corner(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f64 && y < self.height as f64
    }

    /// Size of the sample data in bytes.
    pub fn byte_size(&self) -> usize {
        self.buffer.len() * self.sample_type().size_bytes()
    }

    /// Copy of this raster with another sample type and band count.
    ///
    /// Bands beyond the current band count are set to their fill value.
    /// Converting to a wider type (see [`SampleType::widen`]) is lossless.
    pub fn convert(&self, sample_type: SampleType, bands: usize, fill: &[f64]) -> Raster {
        if sample_type == self.sample_type() && bands == self.bands {
            return self.clone();
        }
        let mut out = Raster::filled(self.width, self.height, bands, sample_type, fill);
        let shared = bands.min(self.bands);
        for row in 0..self.height {
            for col in 0..self.width {
                for band in 0..shared {
                    out.set(col, row, band, self.get(col, row, band));
                }
            }
        }
        out
    }

    /// Copy `src_rect` of `src` into this raster with its top-left at
    /// `(dst_x, dst_y)`. Band counts must match.
    pub fn copy_region(&mut self, src: &Raster, src_rect: PixelRect, dst_x: usize, dst_y: usize) {
        let bands = self.bands.min(src.bands);
        for row in 0..src_rect.height as usize {
            let sy = src_rect.y as usize + row;
            let dy = dst_y + row;
            if sy >= src.height || dy >= self.height {
                break;
            }
            for col in 0..src_rect.width as usize {
                let sx = src_rect.x as usize + col;
                let dx = dst_x + col;
                if sx >= src.width || dx >= self.width {
                    break;
                }
                for band in 0..bands {
                    self.set(dx, dy, band, src.get(sx, sy, band));
                }
            }
        }
    }

    /// New raster holding `rect` of this raster.
    pub fn crop(&self, rect: PixelRect) -> Raster {
        let mut out = Raster::filled(
            rect.width as usize,
            rect.height as usize,
            self.bands,
            self.sample_type(),
            &[],
        );
        out.copy_region(self, rect, 0, 0);
        out
    }

    /// Whether every sample equals its band's fill value (NaN matches NaN).
    pub fn is_all_fill(&self, fill: &[f64]) -> bool {
        let bands = self.bands.max(1);
        (0..self.buffer.len()).all(|i| {
            let value = self.buffer.get(i);
            let expected = fill.get(i % bands).copied().unwrap_or(0.0);
            same_sample(value, expected)
        })
    }
}

/// Sample equality where NaN equals NaN.
#[inline]
pub fn same_sample(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Descriptor of one band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDimension {
    pub name: String,
    pub sample_type: SampleType,
    /// Value marking absent data, if any.
    pub no_data: Option<f64>,
}

impl SampleDimension {
    pub fn new(name: impl Into<String>, sample_type: SampleType) -> Self {
        Self {
            name: name.into(),
            sample_type,
            no_data: None,
        }
    }

    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = Some(no_data);
        self
    }
}

/// Per-band fill values: the declared no-data value, else 0.
pub fn fill_values(dimensions: &[SampleDimension]) -> Vec<f64> {
    dimensions
        .iter()
        .map(|d| d.no_data.unwrap_or(0.0))
        .collect()
}

/// Interpolation method for resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor (preserves exact values).
    Nearest,
    /// Bilinear interpolation (smooth, slight value changes).
    #[default]
    Bilinear,
    /// Bicubic interpolation (smoothest, more compute).
    Cubic,
}

impl InterpolationMethod {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "nearest" => Self::Nearest,
            "cubic" | "bicubic" => Self::Cubic,
            _ => Self::Bilinear,
        }
    }
}

impl std::fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

/// Statistics about a tile cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
