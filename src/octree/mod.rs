//! Occupancy octree: per-voxel log-odds cells in an arena-backed 8-ary tree

pub mod cell;
pub mod node;
pub mod tree;
pub mod prune;
pub mod iter;

pub use cell::{Observation, OccupancyCell, OccupancyModel, OccupancyParams, logodds, probability};
pub use node::{NodeId, OctreeNode};
pub use tree::{LeafHandle, NodeUpdate, OccupancyOctree};
pub use iter::{LeafInfo, LeafIter};
