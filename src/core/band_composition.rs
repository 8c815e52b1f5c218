use crate::core::matrix::{build_band_matrix, ConstantIndexCell, ImageCell, MatrixCell, MosaicMatrix};
use crate::core::scene_layout::SceneLayout;
use crate::io::Jp2ImageFile;
use crate::io::tile_resolver::extract_short_tile_id;
use crate::types::{BandInfo, IndexBandInfo, S2Error, S2Result, TileRectangle};
use ndarray::Array2;
use std::path::PathBuf;

/// Lazily composed mosaic of one band with its multi-resolution pyramid.
///
/// Level 0 is the native mosaic; every further level halves the previous one
/// (nearest-neighbor). Pixel data is only materialized for the cells a region
/// request intersects.
#[derive(Debug)]
pub struct BandMosaic {
    matrix: MosaicMatrix,
    num_resolutions: usize,
    no_data: f32,
}

impl BandMosaic {
    pub fn new(matrix: MosaicMatrix, num_resolutions: usize, no_data: f32) -> Self {
        Self {
            matrix,
            num_resolutions: num_resolutions.max(1),
            no_data,
        }
    }

    pub fn width(&self) -> usize {
        self.matrix.compute_total_width()
    }

    pub fn height(&self) -> usize {
        self.matrix.compute_total_height()
    }

    pub fn level_count(&self) -> usize {
        self.num_resolutions
    }

    pub fn no_data(&self) -> f32 {
        self.no_data
    }

    pub fn matrix(&self) -> &MosaicMatrix {
        &self.matrix
    }

    /// Dimension (width, height) of one pyramid level
    pub fn level_dimension(&self, level: usize) -> (usize, usize) {
        let step = 1usize << level;
        (
            (self.width() + step - 1) / step,
            (self.height() + step - 1) / step,
        )
    }

    /// Pixel data for a region of the native mosaic
    pub fn read_region(&self, region: &TileRectangle) -> Array2<f32> {
        self.matrix.read_region(region, self.no_data)
    }

    /// Pixel data for a region of one pyramid level. The region is given in
    /// level pixel coordinates; only the native cells under it are decoded.
    pub fn read_level_region(&self, level: usize, region: &TileRectangle) -> S2Result<Array2<f32>> {
        if level >= self.num_resolutions {
            return Err(S2Error::InvalidFormat(format!(
                "Pyramid level {} out of range ({} levels)",
                level, self.num_resolutions
            )));
        }
        let step = 1usize << level;
        let native = TileRectangle::new(
            region.x * step as i64,
            region.y * step as i64,
            region.width * step,
            region.height * step,
        );
        let data = self.matrix.read_region(&native, self.no_data);
        let step = step as isize;
        Ok(data.slice(ndarray::s![..;step, ..;step]).to_owned())
    }
}

/// A band rescaled to the reference pixel grid (single-resolution mode).
///
/// The wrapper reports the reference dimensions and resamples the selected
/// region of the native mosaic by nearest neighbor on read.
#[derive(Debug)]
pub struct RescaledBand {
    source: BandMosaic,
    /// Region of the native mosaic the rescaled grid covers
    source_bounds: TileRectangle,
    width: usize,
    height: usize,
}

impl RescaledBand {
    pub fn new(
        source: BandMosaic,
        source_bounds: TileRectangle,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            source,
            source_bounds,
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn read_region(&self, region: &TileRectangle) -> Array2<f32> {
        let source_width = self.source_bounds.width as i64;
        let source_height = self.source_bounds.height as i64;
        let map_x = |x: i64| self.source_bounds.x + (x * source_width) / self.width as i64;
        let map_y = |y: i64| self.source_bounds.y + (y * source_height) / self.height as i64;

        // native region covering the request
        let x0 = map_x(region.x);
        let y0 = map_y(region.y);
        let x1 = self.source_bounds.x
            + (region.right() * source_width + self.width as i64 - 1) / self.width as i64;
        let y1 = self.source_bounds.y
            + (region.bottom() * source_height + self.height as i64 - 1) / self.height as i64;
        let native_region = TileRectangle::new(
            x0,
            y0,
            (x1 - x0).max(1) as usize,
            (y1 - y0).max(1) as usize,
        );
        let native = self.source.read_region(&native_region);

        let mut output = Array2::from_elem(
            (region.height, region.width),
            self.source.no_data(),
        );
        for row in 0..region.height {
            let source_row = (map_y(region.y + row as i64) - y0) as usize;
            for column in 0..region.width {
                let source_column = (map_x(region.x + column as i64) - x0) as usize;
                output[[row, column]] = native[[source_row, source_column]];
            }
        }
        output
    }
}

/// Builds per-band mosaics for a scene.
///
/// Image-backed cells are used for spectral bands, constant-value cells for
/// the tile-index bands; both share the tile rectangles of the scene layout
/// at the band's native resolution.
pub struct BandCompositionEngine<'a> {
    scene_layout: &'a SceneLayout,
    cache_dir: Option<PathBuf>,
}

impl<'a> BandCompositionEngine<'a> {
    pub fn new(scene_layout: &'a SceneLayout, cache_dir: Option<PathBuf>) -> Self {
        Self {
            scene_layout,
            cache_dir,
        }
    }

    /// Mosaic of an image-backed band at its native resolution
    pub fn compose_band(&self, band_info: &BandInfo) -> S2Result<BandMosaic> {
        let resolution = band_info.information.resolution();
        let matrix = build_band_matrix(
            self.scene_layout.ordered_tile_ids(),
            |tile_id| self.scene_layout.tile_rectangle(tile_id, resolution),
            |tile_id| {
                let path = band_info
                    .tile_paths
                    .get(tile_id)
                    .and_then(|path| path.clone())
                    .ok_or_else(|| {
                        S2Error::InvalidFormat(format!(
                            "No {} image for tile {}",
                            band_info.band_name(),
                            tile_id
                        ))
                    })?;
                let image = Jp2ImageFile::new(path, self.cache_dir.clone());
                Ok(MatrixCell::Image(ImageCell::new(image, band_info.layout)))
            },
        )?;
        Ok(BandMosaic::new(matrix, band_info.layout.num_resolutions, 0.0))
    }

    /// Mosaic of a tile-index band built from constant-value cells
    pub fn compose_index_band(
        &self,
        band_info: &BandInfo,
        index_info: &IndexBandInfo,
    ) -> S2Result<BandMosaic> {
        let resolution = band_info.information.resolution();
        let layout = band_info.layout;
        let matrix = build_band_matrix(
            self.scene_layout.ordered_tile_ids(),
            |tile_id| self.scene_layout.tile_rectangle(tile_id, resolution),
            |tile_id| {
                let short_id = extract_short_tile_id(tile_id).unwrap_or_else(|| tile_id.to_string());
                let value = index_info.find_index_sample(&short_id).ok_or_else(|| {
                    S2Error::InvalidFormat(format!("No index sample for tile {}", tile_id))
                })?;
                Ok(MatrixCell::ConstantIndex(ConstantIndexCell::new(
                    layout.width,
                    layout.height,
                    value,
                )))
            },
        )?;
        Ok(BandMosaic::new(matrix, layout.num_resolutions, 0.0))
    }
}

/// Region of the product grid a read request addresses: the full product by
/// default, or the validated subset region.
pub fn compute_product_bounds(
    default_width: usize,
    default_height: usize,
    subset: Option<&TileRectangle>,
) -> S2Result<TileRectangle> {
    let full = TileRectangle::new(0, 0, default_width, default_height);
    match subset {
        None => Ok(full),
        Some(region) => region.intersection(&full).ok_or_else(|| {
            S2Error::InvalidFormat(format!(
                "Subset region {:?} outside the product bounds {}x{}",
                region, default_width, default_height
            ))
        }),
    }
}

/// Map a product-grid region into a band's native grid by percentage scaling
/// of the product bounds, keeping all bands aligned to the same fractional
/// crop regardless of their resolution.
pub fn compute_band_bounds_based_on_percent(
    product_bounds: &TileRectangle,
    default_product_width: usize,
    default_product_height: usize,
    default_band_width: usize,
    default_band_height: usize,
) -> TileRectangle {
    let offset_x_percent = product_bounds.x as f64 / default_product_width as f64;
    let offset_y_percent = product_bounds.y as f64 / default_product_height as f64;
    let width_percent = product_bounds.width as f64 / default_product_width as f64;
    let height_percent = product_bounds.height as f64 / default_product_height as f64;
    TileRectangle::new(
        (offset_x_percent * default_band_width as f64) as i64,
        (offset_y_percent * default_band_height as f64) as i64,
        (width_percent * default_band_width as f64).ceil() as usize,
        (height_percent * default_band_height as f64).ceil() as usize,
    )
}
