//! Core mosaic composition modules

pub mod angles;
pub mod band_composition;
pub mod geocoding;
pub mod matrix;
pub mod scene_layout;

// Re-export main types
pub use angles::{create_tile_angle_grids, AngleBand, AngleGrid, AngleGridMosaicker, AngleId, AnglePrefix};
pub use band_composition::{
    compute_band_bounds_based_on_percent, compute_product_bounds, BandCompositionEngine,
    BandMosaic, RescaledBand,
};
pub use geocoding::{CrsGeoCoding, CrsService, UtmCrsService};
pub use matrix::{build_band_matrix, ConstantIndexCell, ImageCell, MatrixCell, MosaicMatrix};
pub use scene_layout::SceneLayout;
