//! Octree node

use super::cell::OccupancyCell;

/// Index of a node in the octree arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Child slots of an inner node, one per octant.
pub type ChildSlots = [Option<NodeId>; 8];

/// Octree node: a leaf with one occupancy value, or an inner node with
/// eight child slots.
///
/// Inner nodes keep an aggregate cell (the maximum log-odds over their
/// children) so that queries stopping at a coarse depth get a conservative
/// answer.
#[derive(Clone, Debug, PartialEq)]
pub enum OctreeNode {
    Leaf(OccupancyCell),
    Inner {
        cell: OccupancyCell,
        children: ChildSlots,
    },
}

impl OctreeNode {
    pub fn leaf(cell: OccupancyCell) -> Self {
        Self::Leaf(cell)
    }

    /// Occupancy value of this node (aggregate for inner nodes).
    #[inline]
    pub fn cell(&self) -> &OccupancyCell {
        match self {
            Self::Leaf(cell) | Self::Inner { cell, .. } => cell,
        }
    }

    #[inline]
    pub fn cell_mut(&mut self) -> &mut OccupancyCell {
        match self {
            Self::Leaf(cell) | Self::Inner { cell, .. } => cell,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Child slots, or `None` for a leaf.
    #[inline]
    pub fn children(&self) -> Option<&ChildSlots> {
        match self {
            Self::Leaf(_) => None,
            Self::Inner { children, .. } => Some(children),
        }
    }

    #[inline]
    pub fn child(&self, octant: usize) -> Option<NodeId> {
        self.children().and_then(|c| c[octant])
    }

    /// Bit `i` set when octant `i` holds a child.
    pub fn child_mask(&self) -> u8 {
        self.children().map_or(0, |children| {
            children
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_some())
                .fold(0u8, |mask, (i, _)| mask | (1 << i))
        })
    }

    /// Number of present children.
    pub fn child_count(&self) -> u8 {
        self.child_mask().count_ones() as u8
    }

    /// Attach `child` in `octant`, turning a leaf into an inner node that
    /// keeps the leaf's value as its aggregate.
    pub fn set_child(&mut self, octant: usize, child: NodeId) {
        match self {
            Self::Inner { children, .. } => children[octant] = Some(child),
            Self::Leaf(cell) => {
                let cell = *cell;
                let mut children = [None; 8];
                children[octant] = Some(child);
                *self = Self::Inner { cell, children };
            }
        }
    }

    /// Detach the child in `octant`, returning it. An inner node left with
    /// no children stays inner; callers decide whether to drop it.
    pub fn take_child(&mut self, octant: usize) -> Option<NodeId> {
        match self {
            Self::Inner { children, .. } => children[octant].take(),
            Self::Leaf(_) => None,
        }
    }
}

impl Default for OctreeNode {
    fn default() -> Self {
        Self::Leaf(OccupancyCell::default())
    }
}
