//! I/O modules for product tree access and tile image decoding

pub mod cell_reader;
pub mod tile_resolver;
pub mod virtual_path;

pub use cell_reader::Jp2ImageFile;
pub use tile_resolver::TileImageResolver;
pub use virtual_path::{init_cache_dir, LocalFile, VirtualPath};
