use crate::io::VirtualPath;
use crate::types::{S2Result, TileId};
use regex::Regex;
use std::collections::HashMap;

/// Resolves per-tile image files of a product package.
///
/// The resolver only relies on the stable parts of the SAFE layout: the
/// `GRANULE` directory holding one sub-directory per tile, the `IMG_DATA`
/// directory inside each granule, and the `..._<band>.jp2` file name ending
/// convention for band images.
pub struct TileImageResolver {
    product_root: VirtualPath,
}

impl TileImageResolver {
    pub fn new(product_root: VirtualPath) -> Self {
        Self { product_root }
    }

    /// Granule directories in listing order, as (tile id, granule path) pairs.
    /// The tile id is the granule directory name.
    pub fn granule_dirs(&self) -> S2Result<Vec<(TileId, VirtualPath)>> {
        let granule_root = self.product_root.resolve("GRANULE");
        if !granule_root.exists() {
            log::warn!(
                "No GRANULE directory in product {}",
                self.product_root.full_path_string()
            );
            return Ok(Vec::new());
        }
        let mut granules = Vec::new();
        for name in granule_root.list()? {
            granules.push((name.clone(), granule_root.resolve(&name)));
        }
        Ok(granules)
    }

    /// Image file of one band inside a granule, located by the file name
    /// ending convention, `None` when the granule has no image for the band
    pub fn find_band_image(
        &self,
        granule_path: &VirtualPath,
        band_file_token: &str,
    ) -> S2Result<Option<VirtualPath>> {
        let img_data = granule_path.resolve("IMG_DATA");
        if !img_data.exists() {
            return Ok(None);
        }
        let ending = format!("{}.jp2", band_file_token);
        for name in img_data.list()? {
            if name.ends_with(&ending) {
                return Ok(Some(img_data.resolve(&name)));
            }
        }
        Ok(None)
    }

    /// Tile-id to image-path map for one band across all granules
    pub fn resolve_band_images(
        &self,
        band_file_token: &str,
    ) -> S2Result<HashMap<TileId, Option<VirtualPath>>> {
        let mut images = HashMap::new();
        for (tile_id, granule_path) in self.granule_dirs()? {
            let image = self.find_band_image(&granule_path, band_file_token)?;
            if image.is_none() {
                log::warn!("No {} image for tile {}", band_file_token, tile_id);
            }
            images.insert(tile_id, image);
        }
        Ok(images)
    }
}

/// Extract the short UTM tile id (e.g. "T32TMR") from a granule directory name
pub fn extract_short_tile_id(granule_name: &str) -> Option<String> {
    let pattern = Regex::new(r"T\d{2}[A-Z]{3}").expect("invalid tile id pattern");
    pattern
        .find(granule_name)
        .map(|m| m.as_str().to_string())
}
