use crate::core::band_composition::compute_band_bounds_based_on_percent;
use crate::core::geocoding::{CrsGeoCoding, CrsService};
use crate::core::scene_layout::SceneLayout;
use crate::types::{
    band_physical_name, Resolution, S2Error, S2Result, TileAngles, TileId, TileRectangle,
    ANGLES_FILL,
};
use ndarray::Array2;
use std::collections::{HashMap, HashSet};

/// The four angle band families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnglePrefix {
    SunZenith,
    SunAzimuth,
    ViewZenith,
    ViewAzimuth,
}

impl AnglePrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            AnglePrefix::SunZenith => "sun_zenith",
            AnglePrefix::SunAzimuth => "sun_azimuth",
            AnglePrefix::ViewZenith => "view_zenith",
            AnglePrefix::ViewAzimuth => "view_azimuth",
        }
    }

    pub fn is_zenith(self) -> bool {
        matches!(self, AnglePrefix::SunZenith | AnglePrefix::ViewZenith)
    }

    pub fn description(self) -> &'static str {
        match self {
            AnglePrefix::SunZenith => "Solar zenith angle",
            AnglePrefix::SunAzimuth => "Solar azimuth angle",
            AnglePrefix::ViewZenith => "Viewing incidence zenith angle",
            AnglePrefix::ViewAzimuth => "Viewing incidence azimuth angle",
        }
    }
}

impl std::fmt::Display for AnglePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one angle band: family plus optional spectral band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AngleId {
    pub prefix: AnglePrefix,
    pub band_index: Option<i32>,
}

impl AngleId {
    pub fn new(prefix: AnglePrefix, band_index: Option<i32>) -> Self {
        Self { prefix, band_index }
    }

    /// Name of the product band carrying this angle mosaic
    pub fn band_name(&self) -> String {
        match self.band_index {
            Some(index) => format!(
                "{}_{}",
                self.prefix,
                band_physical_name(index).unwrap_or("unknown")
            ),
            None => match self.prefix {
                AnglePrefix::ViewZenith | AnglePrefix::ViewAzimuth => {
                    format!("{}_mean", self.prefix)
                }
                _ => self.prefix.to_string(),
            },
        }
    }

    // sun families first, then the mean view families, then per-band
    // families by ascending band index; zenith always before azimuth
    fn sort_key(&self) -> (u8, i32, u8) {
        match self.band_index {
            None => {
                let rank = match self.prefix {
                    AnglePrefix::SunZenith => 0,
                    AnglePrefix::SunAzimuth => 1,
                    AnglePrefix::ViewZenith => 2,
                    AnglePrefix::ViewAzimuth => 3,
                };
                (0, 0, rank)
            }
            Some(index) => {
                let rank = if self.prefix.is_zenith() { 0 } else { 1 };
                (1, index, rank)
            }
        }
    }
}

impl Ord for AngleId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for AngleId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One coarse per-tile angle grid, tagged with its identity and geometry
#[derive(Debug, Clone)]
pub struct AngleGrid {
    pub id: AngleId,
    /// Map coordinate of the grid's upper-left corner
    pub origin_x: f64,
    pub origin_y: f64,
    /// Cell size in meters per axis
    pub resolution_x: f32,
    pub resolution_y: f32,
    pub data: Array2<f32>,
}

impl AngleGrid {
    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }
}

fn is_valid_angle(value: f32) -> bool {
    value.is_finite()
}

/// Build the angle grids of one tile from the raw metadata grids.
///
/// Per spectral band, the detector grids are merged by overwriting with each
/// detector's valid samples in detector order. The mean view grids average
/// the valid samples of all detector grids per pixel; a pixel no detector
/// covers stays NaN. Sun grids are passed through. Returns `None` when the
/// tile has no angle grids at all.
pub fn create_tile_angle_grids(
    upper_left: (f64, f64),
    angles: &TileAngles,
) -> Option<Vec<AngleGrid>> {
    let (grid_height, grid_width) = angles.sun_zenith.dim();
    if grid_width == 0 || grid_height == 0 {
        return None;
    }

    let make_grid = |id: AngleId, data: Array2<f32>| AngleGrid {
        id,
        origin_x: upper_left.0,
        origin_y: upper_left.1,
        resolution_x: angles.resolution_m,
        resolution_y: angles.resolution_m,
        data,
    };

    let mut grids = Vec::new();

    let detectors_consistent = angles
        .viewing
        .iter()
        .all(|d| d.zenith.dim() == (grid_height, grid_width) && d.azimuth.dim() == (grid_height, grid_width));

    let mut mean_zenith_sum = Array2::<f32>::zeros((grid_height, grid_width));
    let mut mean_zenith_count = Array2::<u32>::zeros((grid_height, grid_width));
    let mut mean_azimuth_sum = Array2::<f32>::zeros((grid_height, grid_width));
    let mut mean_azimuth_count = Array2::<u32>::zeros((grid_height, grid_width));

    if detectors_consistent {
        // per-band grids, detectors merged in order of appearance
        let mut band_order = Vec::new();
        for detector in &angles.viewing {
            if !band_order.contains(&detector.band_index) {
                band_order.push(detector.band_index);
            }
        }
        for band_index in band_order {
            let mut zenith = Array2::from_elem((grid_height, grid_width), f32::NAN);
            let mut azimuth = Array2::from_elem((grid_height, grid_width), f32::NAN);
            for detector in angles.viewing.iter().filter(|d| d.band_index == band_index) {
                for y in 0..grid_height {
                    for x in 0..grid_width {
                        if is_valid_angle(detector.zenith[[y, x]]) {
                            zenith[[y, x]] = detector.zenith[[y, x]];
                        }
                        if is_valid_angle(detector.azimuth[[y, x]]) {
                            azimuth[[y, x]] = detector.azimuth[[y, x]];
                        }
                    }
                }
            }
            grids.push(make_grid(
                AngleId::new(AnglePrefix::ViewZenith, Some(band_index)),
                zenith,
            ));
            grids.push(make_grid(
                AngleId::new(AnglePrefix::ViewAzimuth, Some(band_index)),
                azimuth,
            ));
        }

        // mean view angles across all detector grids, valid samples only
        for detector in &angles.viewing {
            for y in 0..grid_height {
                for x in 0..grid_width {
                    if is_valid_angle(detector.zenith[[y, x]]) {
                        mean_zenith_sum[[y, x]] += detector.zenith[[y, x]];
                        mean_zenith_count[[y, x]] += 1;
                    }
                    if is_valid_angle(detector.azimuth[[y, x]]) {
                        mean_azimuth_sum[[y, x]] += detector.azimuth[[y, x]];
                        mean_azimuth_count[[y, x]] += 1;
                    }
                }
            }
        }
    } else if !angles.viewing.is_empty() {
        log::warn!("Viewing angle grids do not match the sun grid size, keeping mean view angles empty");
    }

    let mut mean_zenith = Array2::from_elem((grid_height, grid_width), f32::NAN);
    let mut mean_azimuth = Array2::from_elem((grid_height, grid_width), f32::NAN);
    for y in 0..grid_height {
        for x in 0..grid_width {
            if mean_zenith_count[[y, x]] > 0 {
                mean_zenith[[y, x]] = mean_zenith_sum[[y, x]] / mean_zenith_count[[y, x]] as f32;
            }
            if mean_azimuth_count[[y, x]] > 0 {
                mean_azimuth[[y, x]] =
                    mean_azimuth_sum[[y, x]] / mean_azimuth_count[[y, x]] as f32;
            }
        }
    }
    grids.push(make_grid(AngleId::new(AnglePrefix::ViewZenith, None), mean_zenith));
    grids.push(make_grid(AngleId::new(AnglePrefix::ViewAzimuth, None), mean_azimuth));

    grids.push(make_grid(
        AngleId::new(AnglePrefix::SunZenith, None),
        angles.sun_zenith.clone(),
    ));
    grids.push(make_grid(
        AngleId::new(AnglePrefix::SunAzimuth, None),
        angles.sun_azimuth.clone(),
    ));

    Some(grids)
}

/// One full-scene angle band produced by the mosaicker
#[derive(Debug, Clone)]
pub struct AngleBand {
    pub id: AngleId,
    pub name: String,
    pub description: String,
    pub unit: String,
    pub resolution_x: f32,
    pub resolution_y: f32,
    pub geo_coding: CrsGeoCoding,
    pub data: Array2<f32>,
}

/// Trim a leading/trailing row/column whose values are uniformly zero,
/// an artifact of the interpolated translation of the tile grids.
/// Returns the cropped grid and the (x, y) offset of the crop.
fn trim_zero_borders(data: &Array2<f32>) -> (Array2<f32>, usize, usize) {
    let (rows, cols) = data.dim();
    let mut y0 = 0usize;
    let mut y1 = rows;
    let mut x0 = 0usize;
    let mut x1 = cols;

    if rows > 1 && (0..cols).all(|x| data[[0, x]] == 0.0) {
        y0 = 1;
    }
    if y1 - y0 > 1 && (0..cols).all(|x| data[[rows - 1, x]] == 0.0) {
        y1 = rows - 1;
    }
    if cols > 1 && (y0..y1).all(|y| data[[y, 0]] == 0.0) {
        x0 = 1;
    }
    if x1 - x0 > 1 && (y0..y1).all(|y| data[[y, cols - 1]] == 0.0) {
        x1 = cols - 1;
    }

    let cropped = data.slice(ndarray::s![y0..y1, x0..x1]).to_owned();
    (cropped, x0, y0)
}

/// Composes per-tile angle grids into full-scene angle bands.
pub struct AngleGridMosaicker<'a> {
    scene_layout: &'a SceneLayout,
}

impl<'a> AngleGridMosaicker<'a> {
    pub fn new(scene_layout: &'a SceneLayout) -> Self {
        Self { scene_layout }
    }

    // scene extent in meters from the first resolution with a dimension
    fn scene_extent_meters(&self) -> Option<(f64, f64)> {
        for resolution in Resolution::VALUES {
            if let Some((width, height)) = self.scene_layout.scene_dimension(resolution) {
                let meters = resolution.meters() as f64;
                return Some((width as f64 * meters, height as f64 * meters));
            }
        }
        None
    }

    /// Build one band per angle identity present across the tiles.
    ///
    /// Tiles without grids are skipped with a warning; inconsistent grid
    /// geometry across tiles is a structural error. A band whose geocoding
    /// cannot be constructed is skipped with a warning.
    pub fn compose_angle_bands(
        &self,
        grids_by_tile: &HashMap<TileId, Vec<AngleGrid>>,
        epsg_code: &str,
        crs: &dyn CrsService,
        product_bounds: &TileRectangle,
        default_product_size: (usize, usize),
    ) -> S2Result<Vec<AngleBand>> {
        let mut tiles: Vec<(&TileId, &Vec<AngleGrid>)> = Vec::new();
        for tile_id in self.scene_layout.ordered_tile_ids() {
            match grids_by_tile.get(tile_id) {
                Some(grids) if !grids.is_empty() => tiles.push((tile_id, grids)),
                _ => log::warn!("No angle grids for tile {}, skipping", tile_id),
            }
        }
        if tiles.is_empty() {
            log::warn!("Invalid tile data for computing the angles mosaic");
            return Ok(Vec::new());
        }

        // all tiles must share the template geometry of the first tile
        let template = &tiles[0].1[0];
        let template_size = template.data.dim();
        let (resolution_x, resolution_y) = (template.resolution_x, template.resolution_y);
        for (tile_id, grids) in &tiles {
            for grid in grids.iter() {
                if grid.data.dim() != template_size
                    || grid.resolution_x != resolution_x
                    || grid.resolution_y != resolution_y
                {
                    return Err(S2Error::Structural(format!(
                        "inconsistent angle grid geometry for tile {}",
                        tile_id
                    )));
                }
            }
        }

        // upper-left-most grid origin across the tiles
        let mut master_x = f64::MAX;
        let mut master_y = f64::MIN;
        for (_, grids) in &tiles {
            master_x = master_x.min(grids[0].origin_x);
            master_y = master_y.max(grids[0].origin_y);
        }

        let (scene_width_m, scene_height_m) = match self.scene_extent_meters() {
            Some(extent) => extent,
            None => {
                log::warn!("No scene dimension available for the angles mosaic");
                return Ok(Vec::new());
            }
        };
        let mosaic_columns = (scene_width_m / resolution_x as f64).ceil() as usize;
        let mosaic_rows = (scene_height_m / resolution_y as f64).ceil() as usize;

        let mut angle_ids: HashSet<AngleId> = HashSet::new();
        for (_, grids) in &tiles {
            for grid in grids.iter() {
                angle_ids.insert(grid.id);
            }
        }
        let mut sorted_ids: Vec<AngleId> = angle_ids.into_iter().collect();
        sorted_ids.sort();

        let mut bands = Vec::new();
        for angle_id in sorted_ids {
            let mut mosaic = Array2::from_elem((mosaic_rows, mosaic_columns), ANGLES_FILL);

            for (_, grids) in &tiles {
                let grid = match grids.iter().find(|g| g.id == angle_id) {
                    Some(grid) => grid,
                    None => continue,
                };
                let translate_x =
                    ((grid.origin_x - master_x) / resolution_x as f64).round() as i64;
                let translate_y =
                    ((master_y - grid.origin_y) / resolution_y as f64).round() as i64;

                let (data, crop_x, crop_y) = trim_zero_borders(&grid.data);
                let (rows, cols) = data.dim();
                // later tiles in traversal order overwrite earlier ones,
                // only with their valid samples
                for row in 0..rows {
                    let target_row = translate_y + crop_y as i64 + row as i64;
                    if target_row < 0 || target_row >= mosaic_rows as i64 {
                        continue;
                    }
                    for column in 0..cols {
                        let target_column = translate_x + crop_x as i64 + column as i64;
                        if target_column < 0 || target_column >= mosaic_columns as i64 {
                            continue;
                        }
                        let value = data[[row, column]];
                        if is_valid_angle(value) {
                            mosaic[[target_row as usize, target_column as usize]] = value;
                        }
                    }
                }
            }

            let band_bounds = compute_band_bounds_based_on_percent(
                product_bounds,
                default_product_size.0,
                default_product_size.1,
                mosaic_columns,
                mosaic_rows,
            );
            let full_bounds = TileRectangle::new(0, 0, mosaic_columns, mosaic_rows);
            let data = if band_bounds == full_bounds {
                mosaic
            } else {
                let clipped = match band_bounds.intersection(&full_bounds) {
                    Some(clipped) => clipped,
                    None => continue,
                };
                mosaic
                    .slice(ndarray::s![
                        clipped.y as usize..clipped.bottom() as usize,
                        clipped.x as usize..clipped.right() as usize
                    ])
                    .to_owned()
            };

            let bounds = TileRectangle::new(band_bounds.x, band_bounds.y, data.dim().1, data.dim().0);
            let geo_coding = match crs.build_geo_coding(
                epsg_code,
                self.scene_layout.scene_origin(),
                (resolution_x as f64, resolution_y as f64),
                &bounds,
            ) {
                Ok(geo_coding) => geo_coding,
                Err(e) => {
                    log::warn!("Skipping angle band {}: {}", angle_id.band_name(), e);
                    continue;
                }
            };

            bands.push(AngleBand {
                id: angle_id,
                name: angle_id.band_name(),
                description: angle_id.prefix.description().to_string(),
                unit: "°".to_string(),
                resolution_x,
                resolution_y,
                geo_coding,
                data,
            });
        }
        Ok(bands)
    }
}
