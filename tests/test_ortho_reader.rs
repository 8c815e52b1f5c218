use ndarray::Array2;
use s2mosaic::types::{
    BandInfo, BandInformation, DetectorAngles, ProductCharacteristics, Resolution,
    S2Error, SpectralBandInfo, TileAngles, TileLayout, TileMetadata, TileRectangle,
};
use s2mosaic::{OrthoMetadata, OrthoProductReader, ReaderProfile, VirtualPath};
use std::collections::HashMap;

fn tile_dimensions() -> HashMap<Resolution, (usize, usize)> {
    // 1200 m tiles: 120 px at 10 m, 60 px at 20 m, 20 px at 60 m
    let mut dimensions = HashMap::new();
    dimensions.insert(Resolution::R10M, (120, 120));
    dimensions.insert(Resolution::R20M, (60, 60));
    dimensions.insert(Resolution::R60M, (20, 20));
    dimensions
}

fn tile_angles(sun_zenith: f32, detector_zeniths: &[f32]) -> TileAngles {
    // one 2x2 angle grid per 1200 m tile at 600 m cells
    TileAngles {
        resolution_m: 600.0,
        sun_zenith: Array2::from_elem((2, 2), sun_zenith),
        sun_azimuth: Array2::from_elem((2, 2), sun_zenith + 90.0),
        viewing: detector_zeniths
            .iter()
            .enumerate()
            .map(|(i, &zenith)| DetectorAngles {
                band_index: 1,
                detector_id: i as i32 + 1,
                zenith: Array2::from_elem((2, 2), zenith),
                azimuth: Array2::from_elem((2, 2), zenith + 100.0),
            })
            .collect(),
    }
}

fn tile(id: &str, easting: f64, northing: f64, angles: Option<TileAngles>) -> TileMetadata {
    TileMetadata {
        id: id.to_string(),
        upper_left_x: easting,
        upper_left_y: northing,
        dimensions: tile_dimensions(),
        angles,
    }
}

fn four_tiles_with_angles() -> Vec<TileMetadata> {
    vec![
        // the north-west tile is covered by two detectors
        tile(
            "L1C_T32TMR_A012345_20200103",
            300000.0,
            5000000.0,
            Some(tile_angles(10.0, &[10.0, 20.0])),
        ),
        tile(
            "L1C_T32TMS_A012345_20200103",
            301200.0,
            5000000.0,
            Some(tile_angles(20.0, &[8.0])),
        ),
        tile(
            "L1C_T32TMT_A012345_20200103",
            300000.0,
            4998800.0,
            Some(tile_angles(30.0, &[8.0])),
        ),
        tile(
            "L1C_T32TMU_A012345_20200103",
            301200.0,
            4998800.0,
            Some(tile_angles(40.0, &[8.0])),
        ),
    ]
}

fn tile_layouts() -> HashMap<Resolution, TileLayout> {
    let mut layouts = HashMap::new();
    for (resolution, size) in [
        (Resolution::R10M, 120),
        (Resolution::R20M, 60),
        (Resolution::R60M, 20),
    ] {
        layouts.insert(
            resolution,
            TileLayout {
                width: size,
                height: size,
                tile_width: size,
                tile_height: size,
                num_x_tiles: 1,
                num_y_tiles: 1,
                num_resolutions: 5,
            },
        );
    }
    layouts
}

fn metadata(tiles: Vec<TileMetadata>, metadata_level: &str) -> OrthoMetadata {
    OrthoMetadata {
        product_name: "S2A_MSIL1C_20200103T101021_N0208_R022_T32TMR_20200103T121023".to_string(),
        characteristics: ProductCharacteristics {
            processing_level: "Level-1C".to_string(),
            metadata_level: metadata_level.to_string(),
            product_start_time: None,
            product_stop_time: None,
        },
        tiles,
        band_information: Vec::new(),
        tile_layouts: tile_layouts(),
    }
}

fn spectral_info(name: &str, band_index: i32, resolution: Resolution) -> BandInformation {
    BandInformation::Spectral(SpectralBandInfo {
        physical_band: name.to_string(),
        band_index,
        resolution,
        wavelength_central: 0.0,
        bandwidth: 0.0,
        unit: "dl".to_string(),
        scaling_factor: 1.0 / 10000.0,
    })
}

/// Band info whose tile images point at a stub file; the cells stay lazy
/// until pixel access, so topology and rescaling never touch the codec.
fn stub_band_info(
    dir: &tempfile::TempDir,
    tiles: &[TileMetadata],
    information: BandInformation,
    layout: TileLayout,
) -> BandInfo {
    std::fs::write(dir.path().join("stub.jp2"), b"not a real jp2").unwrap();
    let root = VirtualPath::open(dir.path()).expect("Failed to open stub product");
    let mut tile_paths = HashMap::new();
    for tile in tiles {
        tile_paths.insert(tile.id.clone(), Some(root.resolve("stub.jp2")));
    }
    BandInfo::new(tile_paths, information, layout)
}

#[test]
fn test_angle_bands_of_a_full_product() {
    let metadata = metadata(four_tiles_with_angles(), "Standard");
    let reader = OrthoProductReader::new(ReaderProfile::l1c("EPSG:32632"));

    let product = reader
        .read_product(Vec::new(), &metadata, None, None)
        .expect("Failed to read the product");

    assert_eq!((product.width, product.height), (240, 240));
    assert_eq!(product.geo_coding.easting, 300000.0);
    assert_eq!(product.geo_coding.pixel_size_x, 10.0);

    // the angle bands come out in the canonical identity order
    assert_eq!(
        product.band_names(),
        vec![
            "sun_zenith",
            "sun_azimuth",
            "view_zenith_mean",
            "view_azimuth_mean",
            "view_zenith_B2",
            "view_azimuth_B2",
        ]
    );

    // one quadrant of the 4x4 mosaic per tile
    let sun_zenith = product.band("sun_zenith").unwrap();
    assert_eq!((sun_zenith.width(), sun_zenith.height()), (4, 4));
    assert_eq!(sun_zenith.geo_coding.pixel_size_x, 600.0);
    let data = sun_zenith.read_pixels(&TileRectangle::new(0, 0, 4, 4));
    assert_eq!(data[[0, 0]], 10.0);
    assert_eq!(data[[0, 3]], 20.0);
    assert_eq!(data[[3, 0]], 30.0);
    assert_eq!(data[[3, 3]], 40.0);
}

#[test]
fn test_detector_overlap_averages_in_the_product() {
    let metadata = metadata(four_tiles_with_angles(), "Standard");
    let reader = OrthoProductReader::new(ReaderProfile::l1c("EPSG:32632"));
    let product = reader
        .read_product(Vec::new(), &metadata, None, None)
        .expect("Failed to read the product");

    let mean = product.band("view_zenith_mean").unwrap();
    let data = mean.read_pixels(&TileRectangle::new(0, 0, 4, 4));
    // two detectors with 10 and 20 degrees cover the north-west tile
    assert_eq!(data[[0, 0]], 15.0);
    // a single detector elsewhere contributes its exact value
    assert_eq!(data[[0, 3]], 8.0);
    assert_eq!(data[[3, 3]], 8.0);
}

#[test]
fn test_brief_metadata_level_skips_angle_bands() {
    let metadata = metadata(four_tiles_with_angles(), "Brief");
    let reader = OrthoProductReader::new(ReaderProfile::l1c("EPSG:32632"));
    let product = reader
        .read_product(Vec::new(), &metadata, None, None)
        .expect("Failed to read the product");
    assert!(product.bands.is_empty());
}

#[test]
fn test_subset_keeps_bands_aligned() {
    let metadata = metadata(four_tiles_with_angles(), "Standard");
    let reader = OrthoProductReader::new(ReaderProfile::l1c("EPSG:32632"));

    // the center quarter of the product
    let subset = TileRectangle::new(60, 60, 120, 120);
    let product = reader
        .read_product(Vec::new(), &metadata, Some(&subset), None)
        .expect("Failed to read the subset");

    assert_eq!((product.width, product.height), (120, 120));
    assert_eq!(product.geo_coding.easting, 300600.0);
    assert_eq!(product.geo_coding.northing, 4999400.0);

    // the angle mosaic is cropped by the same fraction
    let sun_zenith = product.band("sun_zenith").unwrap();
    assert_eq!((sun_zenith.width(), sun_zenith.height()), (2, 2));
    assert_eq!(sun_zenith.geo_coding.easting, 300600.0);
    let data = sun_zenith.read_pixels(&TileRectangle::new(0, 0, 2, 2));
    assert_eq!(data[[0, 0]], 10.0);
    assert_eq!(data[[0, 1]], 20.0);
    assert_eq!(data[[1, 0]], 30.0);
    assert_eq!(data[[1, 1]], 40.0);
}

#[test]
fn test_empty_tile_list_aborts_the_open() {
    let metadata = metadata(Vec::new(), "Standard");
    let reader = OrthoProductReader::new(ReaderProfile::l1c("EPSG:32632"));
    match reader.read_product(Vec::new(), &metadata, None, None) {
        Err(S2Error::InvalidFormat(message)) => {
            assert!(message.contains("No valid tiles"), "message: {}", message)
        }
        other => panic!("expected an invalid-format error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_single_resolution_reader_needs_a_reference_band() {
    let tiles: Vec<TileMetadata> = four_tiles_with_angles()
        .into_iter()
        .map(|mut tile| {
            tile.angles = None;
            tile
        })
        .collect();
    let metadata = metadata(tiles.clone(), "Brief");

    let dir = tempfile::tempdir().unwrap();
    let band_infos = vec![stub_band_info(
        &dir,
        &tiles,
        spectral_info("B5", 4, Resolution::R20M),
        tile_layouts()[&Resolution::R20M],
    )];

    // a 10 m reader cannot read a product with 20 m bands only
    let reader = OrthoProductReader::new(ReaderProfile::l1c_single_resolution(
        "EPSG:32632",
        Resolution::R10M,
    ));
    match reader.read_product(band_infos, &metadata, None, None) {
        Err(S2Error::InvalidFormat(message)) => {
            assert!(message.contains("10 m"), "message: {}", message)
        }
        other => panic!("expected an invalid-format error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_single_resolution_rescales_to_the_reference_grid() {
    let tiles: Vec<TileMetadata> = four_tiles_with_angles()
        .into_iter()
        .map(|mut tile| {
            tile.angles = None;
            tile
        })
        .collect();
    let metadata = metadata(tiles.clone(), "Brief");

    let dir = tempfile::tempdir().unwrap();
    let layouts = tile_layouts();
    let band_infos = vec![
        stub_band_info(
            &dir,
            &tiles,
            spectral_info("B5", 4, Resolution::R20M),
            layouts[&Resolution::R20M],
        ),
        stub_band_info(
            &dir,
            &tiles,
            spectral_info("B1", 0, Resolution::R60M),
            layouts[&Resolution::R60M],
        ),
    ];

    let reader = OrthoProductReader::new(ReaderProfile::l1c_single_resolution(
        "EPSG:32632",
        Resolution::R20M,
    ));
    let product = reader
        .read_product(band_infos, &metadata, None, None)
        .expect("Failed to read the product");

    assert_eq!((product.width, product.height), (120, 120));

    // every band reports the reference dimensions, including the tile
    // indexes of the non-reference resolution
    for name in ["B5", "B1", "tile_id_20m", "tile_id_60m"] {
        let band = product.band(name).unwrap_or_else(|| panic!("missing band {}", name));
        assert_eq!((band.width(), band.height()), (120, 120), "band {}", name);
        assert_eq!(band.geo_coding.pixel_size_x, 20.0, "band {}", name);
    }

    // the rescaled 60 m band degrades to nodata when its stub tiles fail
    // to decode, instead of aborting the read
    let b1 = product.band("B1").unwrap();
    let data = b1.read_pixels(&TileRectangle::new(0, 0, 120, 120));
    assert_eq!(data.dim(), (120, 120));
    assert_eq!(data[[0, 0]], 0.0);
    assert_eq!(data[[119, 119]], 0.0);

    // the tile index decodes without touching any image file
    let index = product.band("tile_id_60m").unwrap();
    let data = index.read_pixels(&TileRectangle::new(0, 0, 120, 120));
    assert_eq!(data[[0, 0]], 1.0);
    assert_eq!(data[[0, 119]], 2.0);
    assert_eq!(data[[119, 0]], 3.0);
    assert_eq!(data[[119, 119]], 4.0);
}

#[test]
fn test_multi_resolution_keeps_native_grids() {
    let tiles: Vec<TileMetadata> = four_tiles_with_angles()
        .into_iter()
        .map(|mut tile| {
            tile.angles = None;
            tile
        })
        .collect();
    let metadata = metadata(tiles.clone(), "Brief");

    let dir = tempfile::tempdir().unwrap();
    let layouts = tile_layouts();
    let band_infos = vec![
        stub_band_info(
            &dir,
            &tiles,
            spectral_info("B2", 1, Resolution::R10M),
            layouts[&Resolution::R10M],
        ),
        stub_band_info(
            &dir,
            &tiles,
            spectral_info("B5", 4, Resolution::R20M),
            layouts[&Resolution::R20M],
        ),
    ];

    let reader = OrthoProductReader::new(ReaderProfile::l1c("EPSG:32632"));
    let product = reader
        .read_product(band_infos, &metadata, None, None)
        .expect("Failed to read the product");

    let b2 = product.band("B2").unwrap();
    assert_eq!((b2.width(), b2.height()), (240, 240));
    assert_eq!(b2.geo_coding.pixel_size_x, 10.0);

    let b5 = product.band("B5").unwrap();
    assert_eq!((b5.width(), b5.height()), (120, 120));
    assert_eq!(b5.geo_coding.pixel_size_x, 20.0);
}
