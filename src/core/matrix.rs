use crate::io::Jp2ImageFile;
use crate::types::{S2Error, S2Result, TileId, TileLayout, TileRectangle};
use ndarray::Array2;
use std::sync::{Arc, OnceLock};

/// Image-file-backed mosaic cell.
///
/// The backing image is decoded on first pixel access and the buffer kept for
/// the product lifetime; the backing files are immutable while the product is
/// open, so there is no invalidation. A failed decode is cached as well: the
/// cell keeps reporting the same error without retrying.
#[derive(Debug)]
pub struct ImageCell {
    image: Jp2ImageFile,
    layout: TileLayout,
    cache: OnceLock<Result<Arc<Array2<f32>>, String>>,
}

impl ImageCell {
    pub fn new(image: Jp2ImageFile, layout: TileLayout) -> Self {
        Self {
            image,
            layout,
            cache: OnceLock::new(),
        }
    }

    fn decoded(&self) -> S2Result<Arc<Array2<f32>>> {
        let cached = self.cache.get_or_init(|| {
            self.image
                .read_full()
                .map(Arc::new)
                .map_err(|e| e.to_string())
        });
        match cached {
            Ok(buffer) => Ok(Arc::clone(buffer)),
            Err(message) => Err(S2Error::InvalidFormat(format!(
                "Failed to decode tile image {}: {}",
                self.image.path().full_path_string(),
                message
            ))),
        }
    }

    /// Decode the sub-region given in cell-local pixel coordinates
    pub fn read_region(&self, region: &TileRectangle) -> S2Result<Array2<f32>> {
        let buffer = self.decoded()?;
        let (rows, cols) = buffer.dim();
        let bounds = TileRectangle::new(0, 0, cols, rows);
        let clipped = region.intersection(&bounds).ok_or_else(|| {
            S2Error::InvalidFormat(format!(
                "Cell region {:?} outside the decoded image {}x{}",
                region, cols, rows
            ))
        })?;
        let slice = buffer.slice(ndarray::s![
            clipped.y as usize..clipped.bottom() as usize,
            clipped.x as usize..clipped.right() as usize
        ]);
        Ok(slice.to_owned())
    }
}

/// Mosaic cell producing one constant sample value, used for tile-index bands
#[derive(Debug, Clone, Copy)]
pub struct ConstantIndexCell {
    pub width: usize,
    pub height: usize,
    pub value: i16,
}

impl ConstantIndexCell {
    pub fn new(width: usize, height: usize, value: i16) -> Self {
        Self { width, height, value }
    }
}

/// One cell of a mosaic matrix: an image-backed cell or a constant-value cell
#[derive(Debug)]
pub enum MatrixCell {
    Image(ImageCell),
    ConstantIndex(ConstantIndexCell),
}

impl MatrixCell {
    pub fn width(&self) -> usize {
        match self {
            MatrixCell::Image(cell) => cell.layout.width,
            MatrixCell::ConstantIndex(cell) => cell.width,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            MatrixCell::Image(cell) => cell.layout.height,
            MatrixCell::ConstantIndex(cell) => cell.height,
        }
    }

    /// Pixel data for a sub-region in cell-local coordinates
    pub fn read_region(&self, region: &TileRectangle) -> S2Result<Array2<f32>> {
        match self {
            MatrixCell::Image(cell) => cell.read_region(region),
            MatrixCell::ConstantIndex(cell) => Ok(Array2::from_elem(
                (region.height, region.width),
                cell.value as f32,
            )),
        }
    }
}

/// Addressable row-major grid of mosaic cells for one band.
///
/// Cell sizes are consistent per row and column, so cell origins follow from
/// the row-0 widths and column-0 heights.
#[derive(Debug)]
pub struct MosaicMatrix {
    row_count: usize,
    column_count: usize,
    cells: Vec<MatrixCell>,
}

impl MosaicMatrix {
    pub fn new(row_count: usize, column_count: usize) -> Self {
        Self {
            row_count,
            column_count,
            cells: Vec::with_capacity(row_count * column_count),
        }
    }

    /// Append the next cell in matrix order (row-major)
    pub fn add_cell(&mut self, cell: MatrixCell) {
        assert!(
            self.cells.len() < self.row_count * self.column_count,
            "matrix is already full"
        );
        self.cells.push(cell);
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn cell_at(&self, row: usize, column: usize) -> &MatrixCell {
        &self.cells[row * self.column_count + column]
    }

    /// Total mosaic width: sum of the row-0 cell widths
    pub fn compute_total_width(&self) -> usize {
        (0..self.column_count)
            .map(|column| self.cell_at(0, column).width())
            .sum()
    }

    /// Total mosaic height: sum of the column-0 cell heights
    pub fn compute_total_height(&self) -> usize {
        (0..self.row_count)
            .map(|row| self.cell_at(row, 0).height())
            .sum()
    }

    /// Rectangle of a cell in mosaic pixel coordinates
    pub fn cell_rectangle(&self, row: usize, column: usize) -> TileRectangle {
        let x: usize = (0..column).map(|c| self.cell_at(0, c).width()).sum();
        let y: usize = (0..row).map(|r| self.cell_at(r, 0).height()).sum();
        let cell = self.cell_at(row, column);
        TileRectangle::new(x as i64, y as i64, cell.width(), cell.height())
    }

    /// Compose pixel data for a region of the mosaic.
    ///
    /// Only cells intersecting the region are decoded. A cell that fails to
    /// decode is logged and skipped; its pixels keep the fill value instead
    /// of aborting the whole read.
    pub fn read_region(&self, region: &TileRectangle, fill: f32) -> Array2<f32> {
        let mut output = Array2::from_elem((region.height, region.width), fill);

        let mut intersecting = Vec::new();
        for row in 0..self.row_count {
            for column in 0..self.column_count {
                let cell_rectangle = self.cell_rectangle(row, column);
                if let Some(overlap) = region.intersection(&cell_rectangle) {
                    intersecting.push((row, column, cell_rectangle, overlap));
                }
            }
        }

        // cells decode independently, output values do not depend on order
        let decode = |(row, column, cell_rectangle, overlap): (
            usize,
            usize,
            TileRectangle,
            TileRectangle,
        )| {
            let local = TileRectangle::new(
                overlap.x - cell_rectangle.x,
                overlap.y - cell_rectangle.y,
                overlap.width,
                overlap.height,
            );
            let data = self.cell_at(row, column).read_region(&local);
            (row, column, overlap, data)
        };

        #[cfg(feature = "parallel")]
        let decoded: Vec<(usize, usize, TileRectangle, S2Result<Array2<f32>>)> = {
            use rayon::prelude::*;
            intersecting.into_par_iter().map(decode).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let decoded: Vec<(usize, usize, TileRectangle, S2Result<Array2<f32>>)> =
            intersecting.into_iter().map(decode).collect();

        for (row, column, overlap, data) in decoded {
            match data {
                Ok(data) => {
                    let y0 = (overlap.y - region.y) as usize;
                    let x0 = (overlap.x - region.x) as usize;
                    let mut target = output.slice_mut(ndarray::s![
                        y0..y0 + overlap.height,
                        x0..x0 + overlap.width
                    ]);
                    target.assign(&data);
                }
                Err(e) => {
                    log::warn!("Skipping mosaic cell ({}, {}): {}", row, column, e);
                }
            }
        }

        output
    }
}

/// Infer the row/column topology of a tile set from rectangle adjacency and
/// build the mosaic matrix, cells constructed by the caller-supplied closure.
///
/// The walk is row-major from the anchor tile whose rectangle origin is
/// (0, 0): at each step the remaining tiles are scanned for the one whose
/// origin equals the expected position; when none matches, a new row starts
/// at the first column of the previous row. Each tile is consumed exactly
/// once, so duplicate origins cannot loop forever (the first one encountered
/// wins). The output ordering depends only on the rectangle coordinates.
pub fn build_band_matrix<R, F>(
    ordered_tile_ids: &[TileId],
    rectangle_of: R,
    mut build_cell: F,
) -> S2Result<MosaicMatrix>
where
    R: Fn(&str) -> Option<TileRectangle>,
    F: FnMut(&str) -> S2Result<MatrixCell>,
{
    let total_count = ordered_tile_ids.len();
    let mut top_left: Option<(&str, TileRectangle)> = None;
    let mut remaining: Vec<Option<(&str, TileRectangle)>> = Vec::with_capacity(total_count);
    for tile_id in ordered_tile_ids {
        let rectangle = rectangle_of(tile_id).ok_or_else(|| {
            S2Error::Structural(format!("missing tile rectangle for tile {}", tile_id))
        })?;
        if rectangle.x == 0 && rectangle.y == 0 {
            top_left = Some((tile_id.as_str(), rectangle));
        } else {
            remaining.push(Some((tile_id.as_str(), rectangle)));
        }
    }
    let top_left = top_left.ok_or_else(|| S2Error::Structural("no tile images".to_string()))?;

    let mut ordered_cells: Vec<(&str, TileRectangle)> = Vec::with_capacity(total_count);
    ordered_cells.push(top_left);
    let mut first_column = Some(top_left.1);
    let mut row_count = 1usize;
    let mut column_count = 1usize;
    let mut current_x = top_left.1.right();
    let mut current_y = top_left.1.y;

    while ordered_cells.len() < total_count {
        let mut next_cell: Option<(&str, TileRectangle)> = None;
        for slot in remaining.iter_mut() {
            if let Some((_, rectangle)) = slot {
                if rectangle.x == current_x && rectangle.y == current_y {
                    next_cell = slot.take();
                    break;
                }
            }
        }
        match next_cell {
            None => {
                // new row
                let first = first_column.ok_or_else(|| {
                    S2Error::Structural("invalid tile rectangles".to_string())
                })?;
                current_x = first.x;
                current_y = first.y + first.height as i64;
                first_column = None;
                row_count += 1;
                column_count = 0;
            }
            Some(cell) => {
                // new column
                if first_column.is_none() {
                    first_column = Some(cell.1);
                }
                column_count += 1;
                current_x += cell.1.width as i64;
                ordered_cells.push(cell);
            }
        }
    }

    if row_count * column_count != total_count {
        return Err(S2Error::Structural(format!(
            "invalid matrix size: row count = {}, column count = {}",
            row_count, column_count
        )));
    }

    let mut matrix = MosaicMatrix::new(row_count, column_count);
    for (tile_id, _) in &ordered_cells {
        matrix.add_cell(build_cell(tile_id)?);
    }
    Ok(matrix)
}
