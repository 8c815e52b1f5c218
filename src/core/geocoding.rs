use crate::types::{S2Error, S2Result, TileRectangle};
use regex::Regex;

/// Affine geocoding of a raster in a projected CRS.
///
/// `easting`/`northing` locate the upper-left corner of pixel (0, 0);
/// northing decreases with increasing pixel row.
#[derive(Debug, Clone, PartialEq)]
pub struct CrsGeoCoding {
    pub epsg_code: String,
    pub easting: f64,
    pub northing: f64,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
    pub width: usize,
    pub height: usize,
}

impl CrsGeoCoding {
    /// Map coordinate of a (fractional) pixel position
    pub fn pixel_to_map(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.easting + x * self.pixel_size_x,
            self.northing - y * self.pixel_size_y,
        )
    }

    /// Pixel position of a map coordinate
    pub fn map_to_pixel(&self, easting: f64, northing: f64) -> (f64, f64) {
        (
            (easting - self.easting) / self.pixel_size_x,
            (self.northing - northing) / self.pixel_size_y,
        )
    }
}

/// Projection service the reader calls once per band or mask.
///
/// Any failure is propagated to the caller and aborts the band (or the
/// product open, for the scene geocoding).
pub trait CrsService {
    /// Build the geocoding of a raster region.
    ///
    /// `scene_origin` is the map coordinate of scene pixel (0, 0) at the
    /// raster's resolution; `bounds` selects the region of the default-sized
    /// raster the geocoding is built for (the whole raster or a subset).
    fn build_geo_coding(
        &self,
        epsg_code: &str,
        scene_origin: (f64, f64),
        pixel_size: (f64, f64),
        bounds: &TileRectangle,
    ) -> S2Result<CrsGeoCoding>;
}

/// CRS service for the UTM zones Sentinel-2 products are delivered in
#[derive(Debug, Default)]
pub struct UtmCrsService;

impl CrsService for UtmCrsService {
    fn build_geo_coding(
        &self,
        epsg_code: &str,
        scene_origin: (f64, f64),
        pixel_size: (f64, f64),
        bounds: &TileRectangle,
    ) -> S2Result<CrsGeoCoding> {
        let pattern = Regex::new(r"^EPSG:32[67]\d{2}$")
            .map_err(|e| S2Error::Geocoding(format!("Regex error: {}", e)))?;
        if !pattern.is_match(epsg_code) {
            return Err(S2Error::Geocoding(format!(
                "Unsupported CRS code '{}'",
                epsg_code
            )));
        }
        let zone: u32 = epsg_code[8..].parse().map_err(|_| {
            S2Error::Geocoding(format!("Invalid UTM zone in CRS code '{}'", epsg_code))
        })?;
        if zone < 1 || zone > 60 {
            return Err(S2Error::Geocoding(format!(
                "UTM zone {} out of range in CRS code '{}'",
                zone, epsg_code
            )));
        }
        if bounds.is_empty() {
            return Err(S2Error::Geocoding("Empty geocoding bounds".to_string()));
        }
        Ok(CrsGeoCoding {
            epsg_code: epsg_code.to_string(),
            easting: scene_origin.0 + bounds.x as f64 * pixel_size.0,
            northing: scene_origin.1 - bounds.y as f64 * pixel_size.1,
            pixel_size_x: pixel_size.0,
            pixel_size_y: pixel_size.1,
            width: bounds.width,
            height: bounds.height,
        })
    }
}
