//! s2mosaic: A Fast, Modular Sentinel-2 Ortho Tile-Mosaic Reader
//!
//! This library assembles orthorectified Sentinel-2 products from their
//! independently georeferenced JPEG2000 tiles: it infers the row/column tile
//! matrix from pixel-rectangle adjacency, lazily composes per-band mosaics
//! with multi-resolution pyramids, reconciles the per-resolution scene grids
//! and derives the per-pixel sun/view angle bands from the coarse per-tile
//! angle grids.

pub mod core;
pub mod io;
pub mod reader;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BandInfo, BandInformation, ProductCharacteristics, Resolution, S2Error, S2Result,
    TileLayout, TileMetadata, TileRectangle,
};

pub use crate::core::{
    AngleGridMosaicker, BandCompositionEngine, BandMosaic, CrsGeoCoding, CrsService,
    MosaicMatrix, SceneLayout, UtmCrsService,
};

pub use io::{TileImageResolver, VirtualPath};

pub use reader::{
    l1c_band_information, Band, BandData, OrthoMetadata, OrthoProductReader, Product,
    ReaderProfile,
};
