use crate::io::virtual_path::VirtualPath;
use crate::types::{S2Error, S2Result};
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// One tile image file, decoded through GDAL on demand.
///
/// Decoding goes through a local file: archive entries are extracted into
/// the product cache directory first (once per product open).
#[derive(Debug, Clone)]
pub struct Jp2ImageFile {
    path: VirtualPath,
    cache_dir: Option<PathBuf>,
}

impl Jp2ImageFile {
    pub fn new(path: VirtualPath, cache_dir: Option<PathBuf>) -> Self {
        Self { path, cache_dir }
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Decode a window of band 1 as float samples
    pub fn read_window(
        &self,
        x: isize,
        y: isize,
        width: usize,
        height: usize,
    ) -> S2Result<Array2<f32>> {
        let local = self.path.local_file(self.cache_dir.as_deref())?;
        read_window_from_file(local.path(), x, y, width, height)
    }

    /// Decode the full image as float samples
    pub fn read_full(&self) -> S2Result<Array2<f32>> {
        let local = self.path.local_file(self.cache_dir.as_deref())?;
        let dataset = Dataset::open(local.path())?;
        let (width, height) = dataset.raster_size();
        read_dataset_window(&dataset, 0, 0, width, height)
    }
}

/// Decode a window of band 1 from a local image file
pub fn read_window_from_file(
    path: &Path,
    x: isize,
    y: isize,
    width: usize,
    height: usize,
) -> S2Result<Array2<f32>> {
    let dataset = Dataset::open(path)?;
    read_dataset_window(&dataset, x, y, width, height)
}

fn read_dataset_window(
    dataset: &Dataset,
    x: isize,
    y: isize,
    width: usize,
    height: usize,
) -> S2Result<Array2<f32>> {
    let band = dataset.rasterband(1)?;
    let buffer = band.read_as::<f32>((x, y), (width, height), (width, height), None)?;
    Array2::from_shape_vec((height, width), buffer.data)
        .map_err(|e| S2Error::InvalidFormat(format!("Failed to reshape decoded window: {}", e)))
}
