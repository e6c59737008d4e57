//! File persistence for occupancy maps

pub mod disk_io;

pub use disk_io::{compress, decompress, load_map, save_map, write_atomic};
