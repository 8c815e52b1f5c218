use crate::core::angles::{create_tile_angle_grids, AngleGrid, AngleGridMosaicker};
use crate::core::band_composition::{
    compute_band_bounds_based_on_percent, compute_product_bounds, BandCompositionEngine,
    BandMosaic, RescaledBand,
};
use crate::core::geocoding::{CrsGeoCoding, CrsService, UtmCrsService};
use crate::core::scene_layout::SceneLayout;
use crate::io::tile_resolver::extract_short_tile_id;
use crate::io::{init_cache_dir, TileImageResolver, VirtualPath};
use crate::types::{
    BandInfo, BandInformation, IndexBandInfo, IndexSample, ProductCharacteristics, Resolution,
    S2Error, S2Result, SpectralBandInfo, TileId, TileLayout, TileMetadata, TileRectangle,
};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::PathBuf;

/// File name tokens of the band images, indexed by band id
const BAND_FILE_TOKENS: [&str; 13] = [
    "B01", "B02", "B03", "B04", "B05", "B06", "B07", "B08", "B8A", "B09", "B10", "B11", "B12",
];

/// Reader configuration: resolution policy, CRS code and naming, replacing
/// the per-mission reader subclasses with one explicit struct.
#[derive(Debug, Clone)]
pub struct ReaderProfile {
    /// EPSG code of the UTM zone the product is read in, e.g. "EPSG:32632"
    pub epsg_code: String,
    /// Reference resolution of the product grid
    pub product_resolution: Resolution,
    /// Keep every band at its native resolution when true, rescale all
    /// bands to the product grid otherwise
    pub multi_resolution: bool,
    /// Sub-directory name of the per-product extraction cache
    pub cache_dir_name: String,
}

impl ReaderProfile {
    /// Multi-resolution L1C profile
    pub fn l1c(epsg_code: &str) -> Self {
        Self {
            epsg_code: epsg_code.to_string(),
            product_resolution: Resolution::R10M,
            multi_resolution: true,
            cache_dir_name: "l1c-reader".to_string(),
        }
    }

    /// Single-resolution profile: every band is rescaled to the given grid
    pub fn l1c_single_resolution(epsg_code: &str, resolution: Resolution) -> Self {
        Self {
            epsg_code: epsg_code.to_string(),
            product_resolution: resolution,
            multi_resolution: false,
            cache_dir_name: format!("l1c-{}-reader", resolution),
        }
    }

    /// Band image file tokens per resolution, the stable name endings used
    /// for directory listing lookups
    pub fn band_file_tokens(resolution: Resolution) -> &'static [&'static str] {
        match resolution {
            Resolution::R10M => &["B02", "B03", "B04", "B08"],
            Resolution::R20M => &["B05", "B06", "B07", "B8A", "B11", "B12"],
            Resolution::R60M => &["B01", "B09", "B10"],
        }
    }
}

/// Spectral band metadata of an L1C product
pub fn l1c_band_information() -> Vec<BandInformation> {
    let bands: [(i32, Resolution, f64, f64); 13] = [
        (0, Resolution::R60M, 443.0, 20.0),
        (1, Resolution::R10M, 490.0, 65.0),
        (2, Resolution::R10M, 560.0, 35.0),
        (3, Resolution::R10M, 665.0, 30.0),
        (4, Resolution::R20M, 705.0, 15.0),
        (5, Resolution::R20M, 740.0, 15.0),
        (6, Resolution::R20M, 783.0, 20.0),
        (7, Resolution::R10M, 842.0, 115.0),
        (8, Resolution::R20M, 865.0, 20.0),
        (9, Resolution::R60M, 945.0, 20.0),
        (10, Resolution::R60M, 1375.0, 30.0),
        (11, Resolution::R20M, 1610.0, 90.0),
        (12, Resolution::R20M, 2190.0, 180.0),
    ];
    bands
        .iter()
        .map(|&(band_index, resolution, wavelength, bandwidth)| {
            BandInformation::Spectral(SpectralBandInfo {
                physical_band: crate::types::BAND_NAMES[band_index as usize].to_string(),
                band_index,
                resolution,
                wavelength_central: wavelength,
                bandwidth,
                unit: "dl".to_string(),
                scaling_factor: 1.0 / 10000.0,
            })
        })
        .collect()
}

/// Resolved metadata of an ortho product, the output of the external
/// metadata-parsing layer the reader consumes as opaque input
#[derive(Debug, Clone)]
pub struct OrthoMetadata {
    pub product_name: String,
    pub characteristics: ProductCharacteristics,
    pub tiles: Vec<TileMetadata>,
    pub band_information: Vec<BandInformation>,
    /// JP2 layout per resolution from the codec probing layer
    pub tile_layouts: HashMap<Resolution, TileLayout>,
}

/// Pixel source of one product band
#[derive(Debug)]
pub enum BandData {
    /// Lazily decoded mosaic with its pyramid
    Mosaic(BandMosaic),
    /// Mosaic rescaled to the reference grid (single-resolution mode)
    Rescaled(RescaledBand),
    /// In-memory grid (angle bands)
    Grid(Array2<f32>),
}

impl BandData {
    pub fn width(&self) -> usize {
        match self {
            BandData::Mosaic(mosaic) => mosaic.width(),
            BandData::Rescaled(band) => band.width(),
            BandData::Grid(data) => data.dim().1,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            BandData::Mosaic(mosaic) => mosaic.height(),
            BandData::Rescaled(band) => band.height(),
            BandData::Grid(data) => data.dim().0,
        }
    }

    /// Pixel data for a region of the band grid
    pub fn read_region(&self, region: &TileRectangle) -> Array2<f32> {
        match self {
            BandData::Mosaic(mosaic) => mosaic.read_region(region),
            BandData::Rescaled(band) => band.read_region(region),
            BandData::Grid(data) => {
                let (rows, cols) = data.dim();
                let mut output = Array2::from_elem((region.height, region.width), f32::NAN);
                let bounds = TileRectangle::new(0, 0, cols, rows);
                if let Some(overlap) = region.intersection(&bounds) {
                    let source = data.slice(ndarray::s![
                        overlap.y as usize..overlap.bottom() as usize,
                        overlap.x as usize..overlap.right() as usize
                    ]);
                    let y0 = (overlap.y - region.y) as usize;
                    let x0 = (overlap.x - region.x) as usize;
                    output
                        .slice_mut(ndarray::s![
                            y0..y0 + overlap.height,
                            x0..x0 + overlap.width
                        ])
                        .assign(&source);
                }
                output
            }
        }
    }
}

/// One band of an open product
#[derive(Debug)]
pub struct Band {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub no_data: f32,
    pub scaling_factor: f64,
    pub spectral_wavelength: f64,
    pub spectral_band_index: i32,
    pub geo_coding: CrsGeoCoding,
    /// Region of the native band grid this band exposes, the full grid or
    /// the percentage-mapped subset region
    pub bounds: TileRectangle,
    pub data: BandData,
}

impl Band {
    pub fn width(&self) -> usize {
        self.bounds.width
    }

    pub fn height(&self) -> usize {
        self.bounds.height
    }

    /// Pixel data for a region in band coordinates (relative to the bounds)
    pub fn read_pixels(&self, region: &TileRectangle) -> Array2<f32> {
        let shifted = TileRectangle::new(
            region.x + self.bounds.x,
            region.y + self.bounds.y,
            region.width,
            region.height,
        );
        self.data.read_region(&shifted)
    }
}

/// In-memory model of an open ortho product
#[derive(Debug)]
pub struct Product {
    pub name: String,
    pub product_type: String,
    pub width: usize,
    pub height: usize,
    pub geo_coding: CrsGeoCoding,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub bands: Vec<Band>,
}

impl Product {
    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|band| band.name == name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|band| band.name.as_str()).collect()
    }
}

/// Reader for orthorectified Sentinel-2 products.
///
/// The reader consumes the resolved metadata and the per-band tile image
/// paths and assembles the in-memory product: scene geometry, lazily
/// composed band mosaics, tile-index bands and the angle band mosaics.
pub struct OrthoProductReader<C: CrsService = UtmCrsService> {
    profile: ReaderProfile,
    crs: C,
}

impl OrthoProductReader<UtmCrsService> {
    pub fn new(profile: ReaderProfile) -> Self {
        Self {
            profile,
            crs: UtmCrsService,
        }
    }
}

impl<C: CrsService> OrthoProductReader<C> {
    pub fn with_crs_service(profile: ReaderProfile, crs: C) -> Self {
        Self { profile, crs }
    }

    pub fn profile(&self) -> &ReaderProfile {
        &self.profile
    }

    /// Open a product from its package root: resolve the per-band tile
    /// images, set up the extraction cache and read the product.
    pub fn open_product(
        &self,
        product_root: &VirtualPath,
        metadata: &OrthoMetadata,
        subset: Option<&TileRectangle>,
    ) -> S2Result<Product> {
        let cache_dir = match init_cache_dir(&self.profile.cache_dir_name, &metadata.product_name)
        {
            Ok(cache_dir) => Some(cache_dir),
            Err(e) => {
                log::warn!("Unable to set up the product cache dir: {}", e);
                None
            }
        };
        let band_infos = self.resolve_band_infos(product_root, metadata)?;
        self.read_product(band_infos, metadata, subset, cache_dir)
    }

    /// Resolve the per-band tile image paths through the tile resolver
    pub fn resolve_band_infos(
        &self,
        product_root: &VirtualPath,
        metadata: &OrthoMetadata,
    ) -> S2Result<Vec<BandInfo>> {
        let resolver = TileImageResolver::new(product_root.clone());
        let mut band_infos = Vec::new();
        for information in &metadata.band_information {
            let resolution = information.resolution();
            let layout = match metadata.tile_layouts.get(&resolution) {
                Some(layout) => *layout,
                None => {
                    log::warn!(
                        "No tile layout at {} for band {}, skipping",
                        resolution,
                        information.physical_band()
                    );
                    continue;
                }
            };
            let token = match information {
                BandInformation::Spectral(info) => {
                    match BAND_FILE_TOKENS.get(info.band_index as usize) {
                        Some(token) => *token,
                        None => continue,
                    }
                }
                BandInformation::Index(_) => continue,
            };
            let tile_paths = resolver.resolve_band_images(token)?;
            if tile_paths.values().all(|path| path.is_none()) {
                log::debug!("No {} images in the product, skipping band", token);
                continue;
            }
            band_infos.push(BandInfo::new(tile_paths, information.clone(), layout));
        }
        Ok(band_infos)
    }

    /// Assemble the product model from resolved inputs.
    ///
    /// Structural and geometry errors abort the open; per-tile decode
    /// failures are deferred to pixel access time and degrade to nodata.
    pub fn read_product(
        &self,
        band_infos: Vec<BandInfo>,
        metadata: &OrthoMetadata,
        subset: Option<&TileRectangle>,
        cache_dir: Option<PathBuf>,
    ) -> S2Result<Product> {
        let scene_layout = SceneLayout::create(&metadata.tiles).map_err(|_| {
            S2Error::InvalidFormat(format!(
                "No valid tiles associated to product [{}]",
                metadata.product_name
            ))
        })?;
        log::debug!(
            "Scene layout: {} tiles, origin {:?}",
            scene_layout.tile_count(),
            scene_layout.scene_origin()
        );

        let product_resolution = self.profile.product_resolution;
        let (default_width, default_height) = scene_layout
            .scene_dimension(product_resolution)
            .ok_or_else(|| {
                S2Error::InvalidFormat(format!(
                    "Unable to retrieve the {} scene dimension of product [{}]",
                    product_resolution, metadata.product_name
                ))
            })?;
        let product_bounds = compute_product_bounds(default_width, default_height, subset)?;

        let product_meters = product_resolution.meters() as f64;
        let geo_coding = self.crs.build_geo_coding(
            &self.profile.epsg_code,
            scene_layout.scene_origin(),
            (product_meters, product_meters),
            &product_bounds,
        )?;

        let engine = BandCompositionEngine::new(&scene_layout, cache_dir);
        let mut bands = Vec::new();

        if !band_infos.is_empty() {
            self.add_bands(
                &mut bands,
                &band_infos,
                &engine,
                &scene_layout,
                &product_bounds,
                (default_width, default_height),
            )?;

            if scene_layout.tile_count() > 1 {
                self.add_tile_indexes(
                    &mut bands,
                    &band_infos,
                    &engine,
                    &scene_layout,
                    &product_bounds,
                    (default_width, default_height),
                )?;
            }

            self.scale_bands(&mut bands, &band_infos, &product_bounds)?;
        }

        if !metadata
            .characteristics
            .metadata_level
            .eq_ignore_ascii_case("Brief")
        {
            self.add_angle_bands(
                &mut bands,
                metadata,
                &scene_layout,
                &product_bounds,
                (default_width, default_height),
            )?;
        }

        Ok(Product {
            name: metadata.product_name.clone(),
            product_type: format!("S2_MSI_{}", metadata.characteristics.processing_level),
            width: product_bounds.width,
            height: product_bounds.height,
            geo_coding,
            start_time: metadata.characteristics.product_start_time,
            stop_time: metadata.characteristics.product_stop_time,
            bands,
        })
    }

    fn band_pixel_size(&self, native: Resolution) -> f64 {
        if self.profile.multi_resolution {
            native.meters() as f64
        } else {
            self.profile.product_resolution.meters() as f64
        }
    }

    fn add_bands(
        &self,
        bands: &mut Vec<Band>,
        band_infos: &[BandInfo],
        engine: &BandCompositionEngine<'_>,
        scene_layout: &SceneLayout,
        product_bounds: &TileRectangle,
        default_product_size: (usize, usize),
    ) -> S2Result<()> {
        for band_info in band_infos {
            let spectral = match &band_info.information {
                BandInformation::Spectral(info) => info,
                BandInformation::Index(_) => continue,
            };
            let native_resolution = spectral.resolution;
            let (band_width, band_height) = scene_layout
                .scene_dimension(native_resolution)
                .ok_or_else(|| {
                    S2Error::InvalidFormat(format!(
                        "Missing {} scene dimension for band {}",
                        native_resolution, spectral.physical_band
                    ))
                })?;
            let band_bounds = compute_band_bounds_based_on_percent(
                product_bounds,
                default_product_size.0,
                default_product_size.1,
                band_width,
                band_height,
            );

            // in single-resolution mode every band ends up on the product
            // grid, so the geocoding is built for the product bounds
            let pixel_size = self.band_pixel_size(native_resolution);
            let geo_bounds = if self.profile.multi_resolution {
                band_bounds
            } else {
                *product_bounds
            };
            let geo_coding = self.crs.build_geo_coding(
                &self.profile.epsg_code,
                scene_layout.scene_origin(),
                (pixel_size, pixel_size),
                &geo_bounds,
            )?;

            let mosaic = engine.compose_band(band_info)?;
            bands.push(Band {
                name: spectral.physical_band.clone(),
                description: format!("Reflectance in band {}", spectral.physical_band),
                unit: spectral.unit.clone(),
                no_data: 0.0,
                scaling_factor: spectral.scaling_factor,
                spectral_wavelength: spectral.wavelength_central,
                spectral_band_index: spectral.band_index,
                geo_coding,
                bounds: band_bounds,
                data: BandData::Mosaic(mosaic),
            });
        }
        Ok(())
    }

    /// Rescale non-reference bands to the product grid in single-resolution
    /// mode. In multi-resolution mode every band keeps its native grid.
    fn scale_bands(
        &self,
        bands: &mut Vec<Band>,
        band_infos: &[BandInfo],
        product_bounds: &TileRectangle,
    ) -> S2Result<()> {
        if self.profile.multi_resolution {
            return Ok(());
        }

        let has_reference = band_infos
            .iter()
            .any(|info| info.information.resolution() == self.profile.product_resolution);
        if !has_reference {
            let meters = self.profile.product_resolution.meters();
            return Err(S2Error::InvalidFormat(format!(
                "Products with no bands at {} m resolution cannot be read by the {} m reader",
                meters, meters
            )));
        }

        let target_width = product_bounds.width;
        let target_height = product_bounds.height;
        for band in bands.iter_mut() {
            if band.width() == target_width && band.height() == target_height {
                continue;
            }
            let data = std::mem::replace(&mut band.data, BandData::Grid(Array2::zeros((0, 0))));
            band.data = match data {
                BandData::Mosaic(mosaic) => {
                    let rescaled =
                        RescaledBand::new(mosaic, band.bounds, target_width, target_height);
                    band.bounds = TileRectangle::new(0, 0, target_width, target_height);
                    BandData::Rescaled(rescaled)
                }
                other => other,
            };
        }
        Ok(())
    }

    /// Tile-index bands: one index-coded band per resolution in use, with
    /// one constant sample value per tile
    fn add_tile_indexes(
        &self,
        bands: &mut Vec<Band>,
        band_infos: &[BandInfo],
        engine: &BandCompositionEngine<'_>,
        scene_layout: &SceneLayout,
        product_bounds: &TileRectangle,
        default_product_size: (usize, usize),
    ) -> S2Result<()> {
        let mut resolutions = Vec::new();
        for band_info in band_infos {
            let resolution = band_info.information.resolution();
            if !resolutions.contains(&resolution) {
                resolutions.push(resolution);
            }
        }

        for resolution in Resolution::VALUES {
            if !resolutions.contains(&resolution) {
                continue;
            }
            let layout = match band_infos
                .iter()
                .find(|info| info.information.resolution() == resolution)
            {
                Some(info) => info.layout,
                None => continue,
            };
            let index_info = make_tile_index_information(resolution, scene_layout.ordered_tile_ids());
            let band_info = BandInfo::new(
                HashMap::new(),
                BandInformation::Index(index_info.clone()),
                layout,
            );

            let (band_width, band_height) = match scene_layout.scene_dimension(resolution) {
                Some(dimension) => dimension,
                None => continue,
            };
            let band_bounds = compute_band_bounds_based_on_percent(
                product_bounds,
                default_product_size.0,
                default_product_size.1,
                band_width,
                band_height,
            );
            let pixel_size = self.band_pixel_size(resolution);
            let geo_bounds = if self.profile.multi_resolution {
                band_bounds
            } else {
                *product_bounds
            };
            let geo_coding = match self.crs.build_geo_coding(
                &self.profile.epsg_code,
                scene_layout.scene_origin(),
                (pixel_size, pixel_size),
                &geo_bounds,
            ) {
                Ok(geo_coding) => geo_coding,
                Err(e) => {
                    log::warn!("It has not been possible to add tile index for resolution {}: {}", resolution, e);
                    continue;
                }
            };

            match engine.compose_index_band(&band_info, &index_info) {
                Ok(mosaic) => bands.push(Band {
                    name: index_info.physical_band.clone(),
                    description: format!("Tile index at {}", resolution),
                    unit: String::new(),
                    no_data: 0.0,
                    scaling_factor: 1.0,
                    spectral_wavelength: 0.0,
                    spectral_band_index: -1,
                    geo_coding,
                    bounds: band_bounds,
                    data: BandData::Mosaic(mosaic),
                }),
                Err(e) => {
                    log::warn!(
                        "It has not been possible to add tile index for resolution {}: {}",
                        resolution,
                        e
                    );
                }
            }
        }
        Ok(())
    }

    fn add_angle_bands(
        &self,
        bands: &mut Vec<Band>,
        metadata: &OrthoMetadata,
        scene_layout: &SceneLayout,
        product_bounds: &TileRectangle,
        default_product_size: (usize, usize),
    ) -> S2Result<()> {
        let mut grids_by_tile: HashMap<TileId, Vec<AngleGrid>> = HashMap::new();
        for tile in &metadata.tiles {
            let angles = match &tile.angles {
                Some(angles) => angles,
                None => continue,
            };
            if let Some(grids) =
                create_tile_angle_grids((tile.upper_left_x, tile.upper_left_y), angles)
            {
                grids_by_tile.insert(tile.id.clone(), grids);
            }
        }

        let mosaicker = AngleGridMosaicker::new(scene_layout);
        let angle_bands = mosaicker.compose_angle_bands(
            &grids_by_tile,
            &self.profile.epsg_code,
            &self.crs,
            product_bounds,
            default_product_size,
        )?;
        for angle_band in angle_bands {
            let (rows, columns) = angle_band.data.dim();
            bands.push(Band {
                name: angle_band.name,
                description: angle_band.description,
                unit: angle_band.unit,
                no_data: f32::NAN,
                scaling_factor: 1.0,
                spectral_wavelength: 0.0,
                spectral_band_index: -1,
                geo_coding: angle_band.geo_coding,
                // the grid is already cropped to the requested region
                bounds: TileRectangle::new(0, 0, columns, rows),
                data: BandData::Grid(angle_band.data),
            });
        }
        Ok(())
    }
}

/// Index band metadata for the per-tile index band of one resolution,
/// samples numbered from 1 in matrix-traversal order
pub fn make_tile_index_information(resolution: Resolution, ordered_tile_ids: &[TileId]) -> IndexBandInfo {
    let samples = ordered_tile_ids
        .iter()
        .enumerate()
        .map(|(i, tile_id)| {
            let short_id = extract_short_tile_id(tile_id).unwrap_or_else(|| tile_id.clone());
            IndexSample {
                value: (i + 1) as i16,
                name: short_id.clone(),
                description: format!("Tile {}", short_id),
            }
        })
        .collect();
    IndexBandInfo {
        physical_band: format!("tile_id_{}", resolution),
        prefix: "tile_".to_string(),
        resolution,
        samples,
    }
}
