use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::io::VirtualPath;

/// Opaque tile (granule) identifier, unique within a product
pub type TileId = String;

/// Fill value for pixels of the angle mosaics with no valid contribution
pub const ANGLES_FILL: f32 = f32::NAN;

/// Spatial resolutions of Sentinel-2 MSI bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    R10M,
    R20M,
    R60M,
}

impl Resolution {
    /// All resolutions, finest first
    pub const VALUES: [Resolution; 3] = [Resolution::R10M, Resolution::R20M, Resolution::R60M];

    /// Pixel size in meters
    pub fn meters(self) -> u32 {
        match self {
            Resolution::R10M => 10,
            Resolution::R20M => 20,
            Resolution::R60M => 60,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.meters())
    }
}

/// Axis-aligned integer pixel rectangle in the product pixel space at one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRectangle {
    pub x: i64,
    pub y: i64,
    pub width: usize,
    pub height: usize,
}

impl TileRectangle {
    pub fn new(x: i64, y: i64, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with another rectangle, `None` when disjoint
    pub fn intersection(&self, other: &TileRectangle) -> Option<TileRectangle> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(TileRectangle::new(x, y, (right - x) as usize, (bottom - y) as usize))
    }
}

/// JPEG2000 tile layout reported by the external codec probing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLayout {
    pub width: usize,
    pub height: usize,
    pub tile_width: usize,
    pub tile_height: usize,
    pub num_x_tiles: usize,
    pub num_y_tiles: usize,
    pub num_resolutions: usize,
}

/// Physical names of the MSI spectral bands, indexed by band id
pub const BAND_NAMES: [&str; 13] = [
    "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8", "B8A", "B9", "B10", "B11", "B12",
];

/// Physical name for a spectral band id, `None` when out of range
pub fn band_physical_name(band_index: i32) -> Option<&'static str> {
    if band_index < 0 {
        return None;
    }
    BAND_NAMES.get(band_index as usize).copied()
}

/// Metadata of one spectral band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralBandInfo {
    pub physical_band: String,
    pub band_index: i32,
    pub resolution: Resolution,
    pub wavelength_central: f64,
    pub bandwidth: f64,
    pub unit: String,
    pub scaling_factor: f64,
}

/// One sample of an index-coded band (e.g. the per-tile index band)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSample {
    pub value: i16,
    pub name: String,
    pub description: String,
}

/// Metadata of an index-coded band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBandInfo {
    pub physical_band: String,
    pub prefix: String,
    pub resolution: Resolution,
    pub samples: Vec<IndexSample>,
}

impl IndexBandInfo {
    /// Sample value registered for a name (tile id)
    pub fn find_index_sample(&self, name: &str) -> Option<i16> {
        self.samples.iter().find(|s| s.name == name).map(|s| s.value)
    }
}

/// Band metadata, spectral or index-coded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BandInformation {
    Spectral(SpectralBandInfo),
    Index(IndexBandInfo),
}

impl BandInformation {
    pub fn physical_band(&self) -> &str {
        match self {
            BandInformation::Spectral(info) => &info.physical_band,
            BandInformation::Index(info) => &info.physical_band,
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            BandInformation::Spectral(info) => info.resolution,
            BandInformation::Index(info) => info.resolution,
        }
    }

    pub fn scaling_factor(&self) -> f64 {
        match self {
            BandInformation::Spectral(info) => info.scaling_factor,
            BandInformation::Index(_) => 1.0,
        }
    }

    pub fn unit(&self) -> &str {
        match self {
            BandInformation::Spectral(info) => &info.unit,
            BandInformation::Index(_) => "",
        }
    }
}

/// One logical band of an open product: metadata, per-tile image paths and
/// the JP2 layout shared by the tile images. Built once at product open.
#[derive(Debug, Clone)]
pub struct BandInfo {
    pub tile_paths: HashMap<TileId, Option<VirtualPath>>,
    pub information: BandInformation,
    pub layout: TileLayout,
}

impl BandInfo {
    pub fn new(
        tile_paths: HashMap<TileId, Option<VirtualPath>>,
        information: BandInformation,
        layout: TileLayout,
    ) -> Self {
        Self { tile_paths, information, layout }
    }

    pub fn band_name(&self) -> &str {
        self.information.physical_band()
    }
}

/// Viewing incidence angle grids of one detector for one spectral band
#[derive(Debug, Clone)]
pub struct DetectorAngles {
    pub band_index: i32,
    pub detector_id: i32,
    pub zenith: Array2<f32>,
    pub azimuth: Array2<f32>,
}

/// Raw per-tile angle grids decoded by the external metadata layer
#[derive(Debug, Clone)]
pub struct TileAngles {
    /// Cell size of the angle grids in meters
    pub resolution_m: f32,
    pub sun_zenith: Array2<f32>,
    pub sun_azimuth: Array2<f32>,
    pub viewing: Vec<DetectorAngles>,
}

/// Geometry and auxiliary data of one tile, as resolved by the metadata layer
#[derive(Debug, Clone)]
pub struct TileMetadata {
    pub id: TileId,
    /// Upper-left corner of the tile in map units (easting, northing)
    pub upper_left_x: f64,
    pub upper_left_y: f64,
    /// Pixel dimensions (width, height) per resolution
    pub dimensions: HashMap<Resolution, (usize, usize)>,
    pub angles: Option<TileAngles>,
}

/// Product-level characteristics resolved from the metadata header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCharacteristics {
    pub processing_level: String,
    pub metadata_level: String,
    pub product_start_time: Option<DateTime<Utc>>,
    pub product_stop_time: Option<DateTime<Utc>>,
}

/// Error types for product reading and mosaic composition
#[derive(Debug, thiserror::Error)]
pub enum S2Error {
    /// Tile topology cannot be inferred, the product is corrupt or incomplete
    #[error("structural error: {0}")]
    Structural(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("invalid product format: {0}")]
    InvalidFormat(String),

    #[error("geocoding error: {0}")]
    Geocoding(String),
}

/// Result type for reader operations
pub type S2Result<T> = Result<T, S2Error>;
