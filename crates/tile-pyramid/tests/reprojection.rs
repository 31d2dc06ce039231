//! Integration tests: reads and writes whose CRS differs from the pyramid's.
//!
//! The pyramids are Web Mercator; requests and sources are geographic.

use std::sync::Arc;

use projection::{StandardTransforms, TransformError};
use pyramid_common::{AffineTransform, BoundingBox, Crs, CrsCode, Envelope, GridGeometry, TileCoord};
use test_utils::create_test_grid;
use tile_pyramid::{
    EngineConfig, GridCoverage, InMemoryTileStore, InterpolationMethod, Mosaic, MosaicGeometry,
    PyramidError, PyramidReader, Raster, ReadRequest, SampleDimension, SampleType,
    TileMatrixSetWriter,
};

const NO_DATA: f64 = -9999.0;

fn dims() -> Vec<SampleDimension> {
    vec![SampleDimension::new("value", SampleType::F32).with_no_data(NO_DATA)]
}

/// Mercator pyramid anchored at (0, 0): "fine" at 50 km (2x2 tiles of
/// 4 px) and "coarse" at 100 km (one tile). Fine tile (x, y) holds
/// `10 * x + y + 1`, the coarse tile holds 99.
fn mercator_store() -> Arc<InMemoryTileStore> {
    let store = InMemoryTileStore::new("merc", dims());
    let pyramid = store
        .create_pyramid(
            "p",
            Crs::new(CrsCode::Epsg3857),
            vec![
                MosaicGeometry::new("fine", 50_000.0, (4, 4), (2, 2), vec![0.0, 0.0]),
                MosaicGeometry::new("coarse", 100_000.0, (4, 4), (1, 1), vec![0.0, 0.0]),
            ],
        )
        .unwrap();
    let fine = pyramid.mosaic("fine").unwrap();
    for x in 0..2 {
        for y in 0..2 {
            let value = (10 * x + y + 1) as f64;
            fine.put_tile(TileCoord::new(x, y), Raster::filled(4, 4, 1, SampleType::F32, &[value]));
        }
    }
    let coarse = pyramid.mosaic("coarse").unwrap();
    coarse.put_tile(TileCoord::new(0, 0), Raster::filled(4, 4, 1, SampleType::F32, &[99.0]));
    Arc::new(store)
}

fn reader(store: Arc<InMemoryTileStore>) -> PyramidReader {
    PyramidReader::new(store, StandardTransforms::shared(), EngineConfig::default())
}

fn writer(store: Arc<InMemoryTileStore>) -> TileMatrixSetWriter {
    TileMatrixSetWriter::new(store, StandardTransforms::shared(), EngineConfig::default())
}

fn geographic_request() -> ReadRequest {
    ReadRequest::new(Envelope::new(
        Crs::new(CrsCode::Epsg4326),
        BoundingBox::new(0.5, -1.0, 1.0, -0.5),
    ))
}

/// 4x4 one-degree pixels over lon 0..4, lat -4..0.
fn geographic_source(crs: CrsCode) -> GridCoverage {
    let geometry = GridGeometry::new(4, 4, AffineTransform::north_up(0.0, 0.0, 1.0), Crs::new(crs));
    let raster = Raster::from_f32(4, 4, create_test_grid(4, 4)).unwrap();
    GridCoverage::new(geometry, dims(), raster).unwrap()
}

#[tokio::test]
async fn test_geographic_request_reads_mercator_tiles() {
    // 0.6 degrees is roughly 67 km at the equator: the 50 km level
    let coverage = reader(mercator_store())
        .read(&geographic_request().with_resolution(0.6, 0.6))
        .await
        .unwrap()
        .into_coverage()
        .unwrap();

    assert_eq!(coverage.geometry.crs.code, CrsCode::Epsg3857);
    assert_eq!((coverage.geometry.width, coverage.geometry.height), (4, 4));
    assert_eq!(
        coverage.geometry.bbox(),
        BoundingBox::new(0.0, -200_000.0, 200_000.0, 0.0)
    );
    let raster = coverage.render().await.unwrap();
    assert!(raster.is_all_fill(&[1.0]));
}

#[tokio::test]
async fn test_geographic_request_without_resolution_reads_coarsest() {
    let coverage = reader(mercator_store())
        .read(&geographic_request())
        .await
        .unwrap()
        .into_coverage()
        .unwrap();

    assert_eq!(
        coverage.geometry.bbox(),
        BoundingBox::new(0.0, -400_000.0, 400_000.0, 0.0)
    );
    let raster = coverage.render().await.unwrap();
    assert_eq!(raster.get(2, 1, 0), 99.0);
}

#[tokio::test]
async fn test_request_without_transform_path_fails() {
    let request = ReadRequest::new(Envelope::new(
        Crs::new(CrsCode::Epsg3413),
        BoundingBox::new(0.0, 0.0, 1000.0, 1000.0),
    ));
    let err = reader(mercator_store()).read(&request).await.unwrap_err();
    assert!(matches!(err, PyramidError::Transform(TransformError::NoPath { .. })));
}

#[tokio::test]
async fn test_geographic_source_written_into_mercator_pyramid() {
    let store = InMemoryTileStore::new("dst", dims());
    store
        .create_pyramid(
            "p",
            Crs::new(CrsCode::Epsg3857),
            vec![MosaicGeometry::new("0", 100_000.0, (4, 4), (2, 2), vec![0.0, 0.0])],
        )
        .unwrap();
    let store = Arc::new(store);

    // lon/lat 0..4 is about 445 km each way: 5 px, touching all four tiles
    let report = writer(Arc::clone(&store))
        .write(&geographic_source(CrsCode::Epsg4326), None, InterpolationMethod::Nearest)
        .await
        .unwrap();
    assert_eq!(report.mosaics, 1);
    assert_eq!(report.tiles_written, 4);

    let mosaic = store.pyramid("p").unwrap().mosaic("0").unwrap();
    let tile = mosaic.get_tile(TileCoord::new(0, 0)).await.unwrap().unwrap();
    // Centre (150 km, -250 km) is about (1.35, -2.25) degrees
    assert_eq!(tile.get(1, 2, 0), 1002.0);
    // Centre (350 km, -350 km) is about (3.14, -3.14) degrees
    assert_eq!(tile.get(3, 3, 0), 3003.0);

    // Centre (450 km, -450 km) lies past the source edge at 4 degrees
    let corner = mosaic.get_tile(TileCoord::new(1, 1)).await.unwrap().unwrap();
    assert_eq!(corner.get(0, 0, 0), NO_DATA);
}

#[tokio::test]
async fn test_write_without_transform_path_fails() {
    let store = InMemoryTileStore::new("dst", dims());
    store
        .create_pyramid(
            "p",
            Crs::new(CrsCode::Epsg3857),
            vec![MosaicGeometry::new("0", 100_000.0, (4, 4), (1, 1), vec![0.0, 0.0])],
        )
        .unwrap();
    let store = Arc::new(store);

    let err = writer(Arc::clone(&store))
        .write(&geographic_source(CrsCode::Epsg3413), None, InterpolationMethod::Nearest)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::Transform(TransformError::NoPath { .. })));
    assert_eq!(store.tile_count(), 0);
}
