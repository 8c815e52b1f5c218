use s2mosaic::core::{build_band_matrix, BandMosaic, ConstantIndexCell, MatrixCell};
use s2mosaic::types::{S2Error, TileRectangle};

fn constant_cell(width: usize, height: usize, value: i16) -> MatrixCell {
    MatrixCell::ConstantIndex(ConstantIndexCell::new(width, height, value))
}

fn build_grid(
    tiles: &[(&str, TileRectangle)],
) -> Result<(s2mosaic::MosaicMatrix, Vec<String>), S2Error> {
    let ids: Vec<String> = tiles.iter().map(|(id, _)| id.to_string()).collect();
    let mut placement_order = Vec::new();
    let matrix = build_band_matrix(
        &ids,
        |tile_id| {
            tiles
                .iter()
                .find(|(id, _)| *id == tile_id)
                .map(|(_, rectangle)| *rectangle)
        },
        |tile_id| {
            let rectangle = tiles.iter().find(|(id, _)| *id == tile_id).unwrap().1;
            placement_order.push(tile_id.to_string());
            Ok(constant_cell(
                rectangle.width,
                rectangle.height,
                placement_order.len() as i16,
            ))
        },
    )?;
    Ok((matrix, placement_order))
}

#[test]
fn test_four_tile_grid_topology() {
    // the 2x2 reference scenario: 100x100 px tiles, row-major placement
    let tiles = [
        ("tile_00", TileRectangle::new(0, 0, 100, 100)),
        ("tile_10", TileRectangle::new(100, 0, 100, 100)),
        ("tile_01", TileRectangle::new(0, 100, 100, 100)),
        ("tile_11", TileRectangle::new(100, 100, 100, 100)),
    ];
    let (matrix, order) = build_grid(&tiles).expect("Failed to build 2x2 matrix");

    assert_eq!(matrix.row_count(), 2);
    assert_eq!(matrix.column_count(), 2);
    assert_eq!(order, vec!["tile_00", "tile_10", "tile_01", "tile_11"]);
    assert_eq!(matrix.compute_total_width(), 200);
    assert_eq!(matrix.compute_total_height(), 200);
}

#[test]
fn test_topology_does_not_depend_on_input_order() {
    let tiles = [
        ("tile_11", TileRectangle::new(100, 100, 100, 100)),
        ("tile_01", TileRectangle::new(0, 100, 100, 100)),
        ("tile_10", TileRectangle::new(100, 0, 100, 100)),
        ("tile_00", TileRectangle::new(0, 0, 100, 100)),
    ];
    let (matrix, order) = build_grid(&tiles).expect("Failed to build reversed matrix");

    assert_eq!((matrix.row_count(), matrix.column_count()), (2, 2));
    assert_eq!(order, vec!["tile_00", "tile_10", "tile_01", "tile_11"]);
}

#[test]
fn test_single_tile_product() {
    let tiles = [("only", TileRectangle::new(0, 0, 50, 50))];
    let (matrix, _) = build_grid(&tiles).expect("Failed to build single-tile matrix");

    assert_eq!((matrix.row_count(), matrix.column_count()), (1, 1));
    assert_eq!(matrix.compute_total_width(), 50);
    assert_eq!(matrix.compute_total_height(), 50);
}

#[test]
fn test_missing_anchor_is_structural() {
    // no tile at origin (0, 0)
    let tiles = [
        ("a", TileRectangle::new(100, 0, 100, 100)),
        ("b", TileRectangle::new(200, 0, 100, 100)),
    ];
    match build_grid(&tiles) {
        Err(S2Error::Structural(message)) => {
            assert!(message.contains("no tile images"), "message: {}", message)
        }
        other => panic!("expected a structural error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_incomplete_grid_is_structural() {
    // an L-shaped tile set can never satisfy rows * columns == count
    let tiles = [
        ("a", TileRectangle::new(0, 0, 100, 100)),
        ("b", TileRectangle::new(100, 0, 100, 100)),
        ("c", TileRectangle::new(0, 100, 100, 100)),
    ];
    match build_grid(&tiles) {
        Err(S2Error::Structural(message)) => {
            assert!(message.contains("invalid matrix size"), "message: {}", message)
        }
        other => panic!("expected a structural error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_uneven_cell_sizes() {
    // a 2x2 grid with a narrower last column and a shorter last row
    let tiles = [
        ("a", TileRectangle::new(0, 0, 100, 100)),
        ("b", TileRectangle::new(100, 0, 60, 100)),
        ("c", TileRectangle::new(0, 100, 100, 40)),
        ("d", TileRectangle::new(100, 100, 60, 40)),
    ];
    let (matrix, _) = build_grid(&tiles).expect("Failed to build uneven matrix");
    assert_eq!(matrix.compute_total_width(), 160);
    assert_eq!(matrix.compute_total_height(), 140);
}

#[test]
fn test_region_read_spans_cells() {
    let tiles = [
        ("a", TileRectangle::new(0, 0, 10, 10)),
        ("b", TileRectangle::new(10, 0, 10, 10)),
        ("c", TileRectangle::new(0, 10, 10, 10)),
        ("d", TileRectangle::new(10, 10, 10, 10)),
    ];
    let (matrix, _) = build_grid(&tiles).expect("Failed to build matrix");

    // a centered region touches all four cells
    let data = matrix.read_region(&TileRectangle::new(5, 5, 10, 10), f32::NAN);
    assert_eq!(data.dim(), (10, 10));
    assert_eq!(data[[0, 0]], 1.0);
    assert_eq!(data[[0, 9]], 2.0);
    assert_eq!(data[[9, 0]], 3.0);
    assert_eq!(data[[9, 9]], 4.0);
}

#[test]
fn test_pyramid_levels() {
    let tiles = [
        ("a", TileRectangle::new(0, 0, 100, 100)),
        ("b", TileRectangle::new(100, 0, 100, 100)),
        ("c", TileRectangle::new(0, 100, 100, 100)),
        ("d", TileRectangle::new(100, 100, 100, 100)),
    ];
    let (matrix, _) = build_grid(&tiles).expect("Failed to build matrix");
    let mosaic = BandMosaic::new(matrix, 5, 0.0);

    assert_eq!(mosaic.level_count(), 5);
    assert_eq!(mosaic.level_dimension(0), (200, 200));
    assert_eq!(mosaic.level_dimension(1), (100, 100));
    assert_eq!(mosaic.level_dimension(4), (13, 13));

    // a level-2 read only needs the cells under the upscaled region
    let data = mosaic
        .read_level_region(2, &TileRectangle::new(0, 0, 50, 50))
        .expect("Failed to read level 2");
    assert_eq!(data.dim(), (50, 50));
    assert_eq!(data[[0, 0]], 1.0);
    assert_eq!(data[[0, 49]], 2.0);
    assert_eq!(data[[49, 49]], 4.0);

    // a read past the last level is rejected
    assert!(mosaic
        .read_level_region(5, &TileRectangle::new(0, 0, 2, 2))
        .is_err());
}
