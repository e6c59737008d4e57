//! Mathematical utilities and data structures

pub mod aabb;
pub mod key;

pub use aabb::Aabb;
pub use key::{KeyMapper, VoxelKey, MAX_TREE_DEPTH};
