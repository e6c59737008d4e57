//! Occtree - probabilistic 3D occupancy mapping on a sparse octree

pub mod core;
pub mod math;
pub mod octree;
pub mod codec;
pub mod storage;
pub mod map;

pub use codec::StreamFormat;
pub use core::{Error, MapConfig, Result};
pub use map::{OccupancyMap, VoxelInfo};
pub use math::{Aabb, VoxelKey};
pub use octree::{LeafHandle, NodeUpdate, Observation, OccupancyParams};
