//! Integration tests: write coverages into an in-memory pyramid and read
//! regions back out of it.
//!
//! Tile values follow `create_test_grid`: value at (col, row) is
//! `col * 1000 + row`, which makes misplaced pixels easy to spot.

use std::sync::Arc;

use projection::StandardTransforms;
use pyramid_common::{AffineTransform, BoundingBox, Crs, CrsCode, Envelope, GridGeometry, TileCoord};
use test_utils::create_test_grid;
use test_utils::fixtures::{bbox, levels};
use tile_pyramid::{
    select_mosaics, CoverageSource, EngineConfig, GridCoverage, InMemoryTileStore,
    InterpolationMethod, Mosaic, MosaicGeometry, PyramidError, PyramidReader, Raster, ReadMode,
    ReadRequest, SampleDimension, SampleType, SelectionConfig, TargetResolution,
    TileGenerator, TileMatrixSetWriter,
};

const NO_DATA: f64 = -9999.0;

fn mercator() -> Crs {
    Crs::new(CrsCode::Epsg3857)
}

fn dims() -> Vec<SampleDimension> {
    vec![SampleDimension::new("value", SampleType::F32).with_no_data(NO_DATA)]
}

/// Two levels over an 8x8 m square anchored at (0, 0): scale 2 (one 4 px
/// tile) and scale 1 (2x2 tiles of 4 px).
fn two_level_store(id: &str) -> Arc<InMemoryTileStore> {
    let store = InMemoryTileStore::new(id, dims());
    store
        .create_pyramid(
            "p",
            mercator(),
            vec![
                MosaicGeometry::new("0", 2.0, (4, 4), (1, 1), vec![0.0, 0.0]),
                MosaicGeometry::new("1", 1.0, (4, 4), (2, 2), vec![0.0, 0.0]),
            ],
        )
        .unwrap();
    Arc::new(store)
}

fn source_coverage(width: usize, height: usize) -> GridCoverage {
    let geometry = GridGeometry::new(
        width,
        height,
        AffineTransform::north_up(0.0, 0.0, 1.0),
        mercator(),
    );
    let raster = Raster::from_f32(width, height, create_test_grid(width, height)).unwrap();
    GridCoverage::new(geometry, dims(), raster).unwrap()
}

fn reader(store: Arc<InMemoryTileStore>, config: EngineConfig) -> PyramidReader {
    PyramidReader::new(store, StandardTransforms::shared(), config)
}

fn square(size: f64) -> Envelope {
    Envelope::new(mercator(), BoundingBox::new(0.0, -size, size, 0.0))
}

#[tokio::test]
async fn test_region_read_maps_onto_whole_tiles() {
    let store = InMemoryTileStore::new("e2e", dims());
    let pyramid = store
        .create_pyramid(
            "p",
            mercator(),
            vec![MosaicGeometry::new(
                "0",
                10.0,
                (levels::TILE_SIZE, levels::TILE_SIZE),
                (2, 2),
                vec![bbox::SMALL_MOSAIC.0, bbox::SMALL_MOSAIC.3],
            )],
        )
        .unwrap();
    let mosaic = pyramid.mosaic("0").unwrap();
    mosaic.put_tile(
        TileCoord::new(0, 0),
        Raster::from_f32(256, 256, create_test_grid(256, 256)).unwrap(),
    );

    let request = ReadRequest::new(Envelope::new(
        mercator(),
        BoundingBox::new(500.0, -1500.0, 1500.0, -500.0),
    ))
    .with_resolution(10.0, 10.0);
    let output = reader(Arc::new(store), EngineConfig::default())
        .read(&request)
        .await
        .unwrap();

    // Pixels (50, 50)-(150, 150) all fall in tile (0, 0)
    let coverage = output.as_coverage().expect("single coverage");
    assert_eq!((coverage.geometry.width, coverage.geometry.height), (256, 256));
    assert_eq!(coverage.geometry.grid_to_world.apply(0.0, 0.0), (0.0, 0.0));
    let raster = coverage.render().await.unwrap();
    assert_eq!(raster.get(100, 100, 0), 100_100.0);
    assert_eq!(raster.get(255, 0, 0), 255_000.0);
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let store = two_level_store("rt");
    let writer = TileMatrixSetWriter::new(
        store.clone(),
        StandardTransforms::shared(),
        EngineConfig::default(),
    );
    let report = writer
        .write(&source_coverage(8, 8), None, InterpolationMethod::Nearest)
        .await
        .unwrap();
    assert_eq!(report.tiles_written, 5);

    let reader = reader(store, EngineConfig::default());

    let fine = reader
        .read(&ReadRequest::new(square(8.0)).with_resolution(1.0, 1.0))
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    let raster = fine.render().await.unwrap();
    assert_eq!((raster.width, raster.height), (8, 8));
    let expected = create_test_grid(8, 8);
    for row in 0..8 {
        for col in 0..8 {
            assert_eq!(raster.get(col, row, 0), expected[row * 8 + col] as f64);
        }
    }

    // Coarse level samples every second source pixel
    let coarse = reader
        .read(&ReadRequest::new(square(8.0)).with_resolution(2.0, 2.0))
        .await
        .unwrap()
        .into_coverage()
        .unwrap();
    let raster = coarse.render().await.unwrap();
    assert_eq!((raster.width, raster.height), (4, 4));
    assert_eq!(raster.get(0, 0, 0), 1001.0);
    assert_eq!(raster.get(3, 3, 0), 7007.0);
}

#[tokio::test]
async fn test_missing_tiles_read_as_no_data() {
    let store = two_level_store("empty");
    let output = reader(store, EngineConfig::default())
        .read(&ReadRequest::new(square(8.0)).with_resolution(1.0, 1.0))
        .await
        .unwrap();

    let coverage = output.as_coverage().unwrap();
    let raster = coverage.render().await.unwrap();
    assert_eq!((raster.width, raster.height), (8, 8));
    assert!(raster.is_all_fill(&[NO_DATA]));
}

#[tokio::test]
async fn test_deferred_read_matches_eager_read() {
    let store = two_level_store("deferred");
    let fine = store.pyramid("p").unwrap().mosaic("1").unwrap();
    fine.put_tile(
        TileCoord::new(1, 0),
        Raster::from_f32(4, 4, create_test_grid(4, 4)).unwrap(),
    );

    let request = ReadRequest::new(square(8.0)).with_resolution(1.0, 1.0);
    let eager = reader(store.clone(), EngineConfig::default())
        .read(&request)
        .await
        .unwrap()
        .into_coverage()
        .unwrap();

    let config = EngineConfig {
        read_mode: ReadMode::Deferred,
        ..EngineConfig::default()
    };
    let deferred = reader(store, config)
        .read(&request)
        .await
        .unwrap()
        .into_coverage()
        .unwrap();

    assert!(!eager.is_deferred());
    assert!(deferred.is_deferred());
    assert_eq!(deferred.geometry, eager.geometry);
    let lazy = deferred.render().await.unwrap();
    let full = eager.render().await.unwrap();
    assert_eq!(*lazy, *full);
    assert_eq!(lazy.get(5, 1, 0), 1001.0);
    assert_eq!(lazy.get(0, 0, 0), NO_DATA);
}

#[tokio::test]
async fn test_pyramid_to_pyramid_generation() {
    let source_store = two_level_store("src");
    TileMatrixSetWriter::new(
        source_store.clone(),
        StandardTransforms::shared(),
        EngineConfig::default(),
    )
    .write(&source_coverage(8, 8), None, InterpolationMethod::Nearest)
    .await
    .unwrap();

    let config = EngineConfig {
        interpolation: InterpolationMethod::Nearest,
        ..EngineConfig::default()
    };
    let source: Arc<dyn CoverageSource> = Arc::new(reader(source_store, config.clone()));

    let target = InMemoryTileStore::new("dst", dims());
    target
        .create_pyramid(
            "p",
            mercator(),
            vec![MosaicGeometry::new("0", 1.0, (4, 4), (2, 2), vec![0.0, 0.0])],
        )
        .unwrap();
    let generator = TileGenerator::new(source, dims(), StandardTransforms::shared(), config);
    let report = generator.generate_all(&target, &square(8.0)).await.unwrap();

    assert_eq!(report.tiles_generated, 4);
    assert_eq!(report.tiles_written, 4);
    assert_eq!(report.tiles_empty, 0);

    let tile = target
        .pyramid("p")
        .unwrap()
        .mosaic("0")
        .unwrap()
        .get_tile(TileCoord::new(1, 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tile.get(0, 0, 0), 4004.0);
    assert_eq!(tile.get(3, 3, 0), 7007.0);
}

#[tokio::test]
async fn test_read_only_store_rejects_writes() {
    let store = InMemoryTileStore::new("ro", dims()).read_only();
    let writer = TileMatrixSetWriter::new(
        Arc::new(store),
        StandardTransforms::shared(),
        EngineConfig::default(),
    );
    let err = writer
        .write(&source_coverage(2, 2), None, InterpolationMethod::Nearest)
        .await
        .unwrap_err();
    assert!(matches!(err, PyramidError::ReadOnly(_)));
}

#[test]
fn test_selection_skips_disjoint_mosaics() {
    let store = InMemoryTileStore::new("split", dims());
    let pyramid = store
        .create_pyramid(
            "p",
            mercator(),
            vec![
                MosaicGeometry::new("west", 1.0, (4, 4), (1, 1), vec![0.0, 0.0]),
                MosaicGeometry::new("east", 1.0, (4, 4), (1, 1), vec![100.0, 0.0]),
            ],
        )
        .unwrap();

    let query = Envelope::new(mercator(), BoundingBox::new(1.0, -3.0, 3.0, -1.0));
    let chosen = select_mosaics(
        pyramid.as_ref(),
        TargetResolution::from_resolution(Some((1.0, 1.0))),
        &query,
        &SelectionConfig::default(),
    )
    .unwrap();
    assert_eq!(chosen.len(), 1);
    assert_eq!(chosen[0].id(), "west");

    let nowhere = Envelope::new(mercator(), BoundingBox::new(50.0, -3.0, 60.0, -1.0));
    let err = select_mosaics(
        pyramid.as_ref(),
        TargetResolution::Coarsest,
        &nowhere,
        &SelectionConfig::default(),
    )
    .err()
    .expect("expected selection error");
    assert!(err.is_disjoint());
}
