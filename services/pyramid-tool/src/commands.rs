//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use projection::StandardTransforms;
use pyramid_common::{AffineTransform, BoundingBox, Crs, CrsCode, Envelope, GridGeometry};
use tile_pyramid::types::same_sample;
use tile_pyramid::{
    GridCoverage, InMemoryTileStore, InterpolationMethod, MosaicGeometry, PyramidLayout,
    PyramidReader, Raster, ReadRequest, SampleDimension, SampleType, TileMatrixSetWriter,
    WriteReport,
};

use crate::config::ToolConfig;

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    BoundingBox::parse(s).map_err(|e| e.to_string())
}

fn parse_crs(s: &str) -> Result<CrsCode, String> {
    CrsCode::parse(s).map_err(|e| e.to_string())
}

#[derive(Args, Debug)]
pub struct LayoutArgs {
    /// Extent as minx,miny,maxx,maxy
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub extent: BoundingBox,

    /// World units per pixel of the finest level
    #[arg(long)]
    pub base_scale: f64,

    /// Comma-separated ordinates of a single extra axis, one mosaic set per value
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub slices: Vec<f64>,
}

/// Print the mosaic geometries of a pyramid layout as JSON.
pub fn run_layout(config: &ToolConfig, args: &LayoutArgs) -> Result<()> {
    let slices: Vec<Vec<f64>> = args.slices.iter().map(|&v| vec![v]).collect();
    let geometries = PyramidLayout::levels(&args.extent, args.base_scale, &config.layout, &slices)?;
    info!(mosaics = geometries.len(), "Computed pyramid layout");
    println!("{}", serde_json::to_string_pretty(&geometries)?);
    Ok(())
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Source CRS
    #[arg(long, value_parser = parse_crs, default_value = "EPSG:3857")]
    pub crs: CrsCode,

    /// Source width in pixels
    #[arg(long)]
    pub width: usize,

    /// Source height in pixels
    #[arg(long)]
    pub height: usize,

    /// World units per source pixel
    #[arg(long)]
    pub scale: f64,

    /// Upper-left x of the source grid
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub origin_x: f64,

    /// Upper-left y of the source grid
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub origin_y: f64,

    /// Raw little-endian f32 raster, row-major; a gradient is used when absent
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// No-data value of the single band
    #[arg(long, default_value_t = -9999.0, allow_hyphen_values = true)]
    pub no_data: f64,

    /// Interpolation used for the pyramid write (nearest, bilinear, cubic)
    #[arg(long, default_value = "bilinear")]
    pub interpolation: String,

    /// Region to read back as minx,miny,maxx,maxy (whole pyramid when absent)
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub read_bbox: Option<BoundingBox>,

    /// Pixel size wanted for the read back (coarsest level when absent)
    #[arg(long)]
    pub read_resolution: Option<f64>,
}

/// Summary of one coverage read back from the pyramid.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegionStats {
    pub width: usize,
    pub height: usize,
    pub bbox: BoundingBox,
    pub valid_pixels: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RegionStats {
    fn compute(geometry: &GridGeometry, raster: &Raster, no_data: f64) -> Self {
        let mut valid_pixels = 0;
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        for row in 0..raster.height {
            for col in 0..raster.width {
                let value = raster.get(col, row, 0);
                if same_sample(value, no_data) || value.is_nan() {
                    continue;
                }
                valid_pixels += 1;
                min = Some(min.map_or(value, |m| m.min(value)));
                max = Some(max.map_or(value, |m| m.max(value)));
            }
        }
        Self {
            width: raster.width,
            height: raster.height,
            bbox: geometry.bbox(),
            valid_pixels,
            min,
            max,
        }
    }
}

/// Outcome of `build`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub levels: Vec<MosaicGeometry>,
    pub mosaics_written: usize,
    pub tiles_written: usize,
    pub pixels_resampled: usize,
    pub regions: Vec<RegionStats>,
}

impl BuildSummary {
    fn new(levels: Vec<MosaicGeometry>, report: WriteReport, regions: Vec<RegionStats>) -> Self {
        Self {
            levels,
            mosaics_written: report.mosaics,
            tiles_written: report.tiles_written,
            pixels_resampled: report.pixels_resampled,
            regions,
        }
    }
}

async fn load_source(args: &BuildArgs) -> Result<Raster> {
    let samples = args.width * args.height;
    let data = match &args.input {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if bytes.len() != samples * 4 {
                bail!(
                    "{} holds {} bytes, a {}x{} f32 raster needs {}",
                    path.display(),
                    bytes.len(),
                    args.width,
                    args.height,
                    samples * 4
                );
            }
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        }
        None => (0..samples)
            .map(|i| ((i % args.width) + (i / args.width)) as f32)
            .collect(),
    };
    Ok(Raster::from_f32(args.width, args.height, data)?)
}

/// Lay out an in-memory pyramid over the source, write the source into
/// every level and read a region back.
pub async fn build_pyramid(config: &ToolConfig, args: &BuildArgs) -> Result<BuildSummary> {
    let crs = Crs::new(args.crs);
    let dimensions = vec![SampleDimension::new("value", SampleType::F32).with_no_data(args.no_data)];

    let raster = load_source(args).await?;
    let geometry = GridGeometry::new(
        args.width,
        args.height,
        AffineTransform::north_up(args.origin_x, args.origin_y, args.scale),
        crs.clone(),
    );
    let coverage = GridCoverage::new(geometry, dimensions.clone(), raster)?;

    let levels = PyramidLayout::levels(&coverage.geometry.bbox(), args.scale, &config.layout, &[])?;
    let store = Arc::new(InMemoryTileStore::new("pyramid-tool", dimensions));
    store.create_pyramid("main", crs.clone(), levels.clone())?;
    info!(levels = levels.len(), crs = %crs, "Created in-memory pyramid");

    let writer = TileMatrixSetWriter::new(
        store.clone(),
        StandardTransforms::shared(),
        config.engine.clone(),
    );
    let interpolation = InterpolationMethod::from_str(&args.interpolation);
    let report = writer.write(&coverage, None, interpolation).await?;

    let reader = PyramidReader::new(store, StandardTransforms::shared(), config.engine.clone());
    let mut request = match args.read_bbox {
        Some(bbox) => ReadRequest::new(Envelope::new(crs, bbox)),
        None => ReadRequest::full(),
    };
    if let Some(resolution) = args.read_resolution {
        request = request.with_resolution(resolution, resolution);
    }
    let output = reader.read(&request).await?;

    let mut regions = Vec::new();
    for coverage in output.coverages() {
        let raster = coverage.render().await?;
        regions.push(RegionStats::compute(&coverage.geometry, &raster, args.no_data));
    }
    info!(
        tiles = report.tiles_written,
        regions = regions.len(),
        "Pyramid built and read back"
    );

    Ok(BuildSummary::new(levels, report, regions))
}

pub async fn run_build(config: &ToolConfig, args: &BuildArgs) -> Result<()> {
    let summary = build_pyramid(config, args).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
