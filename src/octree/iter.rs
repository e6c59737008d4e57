//! Leaf traversal in fixed octant order.

use super::cell::OccupancyCell;
use super::node::{NodeId, OctreeNode};
use super::tree::OccupancyOctree;
use crate::math::key::VoxelKey;

/// A leaf visited by [`LeafIter`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafInfo {
    /// Key of the leaf, bits below `depth` cleared.
    pub key: VoxelKey,
    /// Depth of the leaf; less than the tree depth for pruned leaves.
    pub depth: u8,
    pub cell: OccupancyCell,
}

/// Pre-order iterator over all leaves, children visited in octant order 0..8.
pub struct LeafIter<'a> {
    tree: &'a OccupancyOctree,
    stack: Vec<(NodeId, u8, VoxelKey)>,
}

impl<'a> LeafIter<'a> {
    fn new(tree: &'a OccupancyOctree) -> Self {
        let mut stack = Vec::with_capacity(tree.tree_depth() as usize * 8);
        if let Some(root) = tree.root() {
            stack.push((root, 0, VoxelKey::default()));
        }
        Self { tree, stack }
    }
}

impl Iterator for LeafIter<'_> {
    type Item = LeafInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let tree_depth = self.tree.tree_depth();
        while let Some((id, depth, key)) = self.stack.pop() {
            match self.tree.node(id) {
                OctreeNode::Leaf(cell) => {
                    return Some(LeafInfo { key, depth, cell: *cell });
                }
                OctreeNode::Inner { children, .. } => {
                    for (octant, child) in children.iter().enumerate().rev() {
                        if let Some(child) = child {
                            let child_key = key.child_key(octant, depth, tree_depth);
                            self.stack.push((*child, depth + 1, child_key));
                        }
                    }
                }
            }
        }
        None
    }
}

impl OccupancyOctree {
    /// Iterate over all leaves.
    pub fn leaves(&self) -> LeafIter<'_> {
        LeafIter::new(self)
    }

    /// Number of leaves (max-depth voxels and pruned leaves).
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::cell::{Observation, OccupancyModel};

    #[test]
    fn test_empty_tree_has_no_leaves() {
        let tree = OccupancyOctree::new(16, OccupancyModel::default(), 0.0);
        assert_eq!(tree.leaves().count(), 0);
    }

    #[test]
    fn test_leaves_report_keys_in_octant_order() {
        let mut tree = OccupancyOctree::new(16, OccupancyModel::default(), 0.0);
        let keys = [
            VoxelKey::new(1, 0, 0),
            VoxelKey::new(0, 0, 0),
            VoxelKey::new(40000, 3, 9),
            VoxelKey::new(0, 1, 0),
        ];
        for key in keys {
            tree.update(key, Observation::Occupied.into());
        }

        let visited: Vec<LeafInfo> = tree.leaves().collect();
        assert_eq!(visited.len(), 4);
        assert!(visited.iter().all(|l| l.depth == 16));
        let order: Vec<VoxelKey> = visited.iter().map(|l| l.key).collect();
        assert_eq!(
            order,
            vec![
                VoxelKey::new(0, 0, 0),
                VoxelKey::new(1, 0, 0),
                VoxelKey::new(0, 1, 0),
                VoxelKey::new(40000, 3, 9),
            ]
        );
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn test_pruned_leaf_depth() {
        let mut tree = OccupancyOctree::new(16, OccupancyModel::default(), 0.0);
        for octant in 0..8u16 {
            let key = VoxelKey::new(octant & 1, (octant >> 1) & 1, (octant >> 2) & 1);
            tree.update(key, Observation::Free.into());
        }
        tree.prune();
        let leaves: Vec<_> = tree.leaves().collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].depth, 15);
        assert_eq!(leaves[0].key, VoxelKey::new(0, 0, 0));
    }
}
