//! Occupancy octree container

use super::cell::{Observation, OccupancyCell, OccupancyModel};
use super::node::{ChildSlots, NodeId, OctreeNode};
use crate::math::key::VoxelKey;

/// How an update changes the value of the target leaf.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeUpdate {
    /// Fuse a sensor observation using the tree's model.
    Observe(Observation),
    /// Add a raw log-odds increment.
    AddLogOdds(f32),
    /// Overwrite the log-odds value.
    SetLogOdds(f32),
}

impl From<Observation> for NodeUpdate {
    fn from(observation: Observation) -> Self {
        Self::Observe(observation)
    }
}

/// Snapshot of a node returned by updates and queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafHandle {
    key: VoxelKey,
    depth: u8,
    cell: OccupancyCell,
    occupancy_thres: f32,
}

impl LeafHandle {
    /// Key of the node, with bits below its depth cleared.
    pub fn key(&self) -> VoxelKey {
        self.key
    }

    /// Depth of the node (0 = root).
    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn cell(&self) -> OccupancyCell {
        self.cell
    }

    pub fn log_odds(&self) -> f32 {
        self.cell.log_odds()
    }

    pub fn occupancy_probability(&self) -> f64 {
        self.cell.occupancy_probability()
    }

    /// Classification against the map's occupancy threshold.
    pub fn is_occupied(&self) -> bool {
        self.cell.log_odds() >= self.occupancy_thres
    }
}

/// Sparse occupancy octree stored as an arena of nodes.
///
/// The root (if any) and every child are addressed by [`NodeId`]. Slots
/// released by pruning or deletion go on a free list and are reused by
/// later allocations; [`OccupancyOctree::compact`] renumbers the arena.
#[derive(Debug, Clone)]
pub struct OccupancyOctree {
    nodes: Vec<OctreeNode>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    tree_depth: u8,
    model: OccupancyModel,
    prune_tolerance: f32,
}

impl OccupancyOctree {
    /// Create an empty tree.
    pub fn new(tree_depth: u8, model: OccupancyModel, prune_tolerance: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            tree_depth,
            model,
            prune_tolerance,
        }
    }

    /// Create with pre-allocated node capacity
    pub fn with_capacity(
        tree_depth: u8,
        model: OccupancyModel,
        prune_tolerance: f32,
        node_capacity: usize,
    ) -> Self {
        let mut tree = Self::new(tree_depth, model, prune_tolerance);
        tree.nodes.reserve(node_capacity);
        tree
    }

    pub fn tree_depth(&self) -> u8 {
        self.tree_depth
    }

    pub fn model(&self) -> &OccupancyModel {
        &self.model
    }

    pub fn prune_tolerance(&self) -> f32 {
        self.prune_tolerance
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: Option<NodeId>) {
        self.root = root;
    }

    /// Get node by id
    pub fn node(&self, id: NodeId) -> &OctreeNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut OctreeNode {
        &mut self.nodes[id.index()]
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Number of released arena slots waiting for reuse.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Calculate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<OctreeNode>() * self.nodes.capacity()
            + std::mem::size_of::<NodeId>() * self.free.capacity()
    }

    /// Add a node and return its id, reusing a released slot if possible.
    pub(crate) fn alloc(&mut self, node: OctreeNode) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = node;
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id.index()] = OctreeNode::default();
        self.free.push(id);
    }

    /// Release a node and all of its descendants.
    pub(crate) fn release_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(children) = self.nodes[id.index()].children() {
                stack.extend(children.iter().flatten());
            }
            self.release(id);
        }
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
    }

    fn new_leaf(&self) -> OctreeNode {
        OctreeNode::leaf(OccupancyCell::prior(&self.model))
    }

    fn handle(&self, id: NodeId, key: VoxelKey, depth: u8) -> LeafHandle {
        LeafHandle {
            key: key.at_depth(depth, self.tree_depth),
            depth,
            cell: *self.nodes[id.index()].cell(),
            occupancy_thres: self.model.occupancy_thres,
        }
    }

    /// Replace a leaf by an inner node whose eight children copy its value.
    pub(crate) fn expand_node(&mut self, id: NodeId) -> [NodeId; 8] {
        let cell = *self.nodes[id.index()].cell();
        let mut ids = [id; 8];
        let mut children: ChildSlots = [None; 8];
        for octant in 0..8 {
            let child = self.alloc(OctreeNode::leaf(cell));
            ids[octant] = child;
            children[octant] = Some(child);
        }
        self.nodes[id.index()] = OctreeNode::Inner { cell, children };
        ids
    }

    /// Recompute an inner node's aggregate as the max over its children.
    pub(crate) fn refresh_inner(&mut self, id: NodeId) {
        let Some(children) = self.nodes[id.index()].children().copied() else {
            return;
        };
        let max = children
            .iter()
            .flatten()
            .map(|c| self.nodes[c.index()].cell().log_odds())
            .fold(f32::NEG_INFINITY, f32::max);
        if max.is_finite() {
            *self.nodes[id.index()].cell_mut() = OccupancyCell::new(max);
        }
    }

    /// Apply an update to the max-depth leaf addressed by `key`.
    ///
    /// Missing nodes along the path are created at the prior. A leaf met
    /// above max depth that existed before this call (a pruned region) is
    /// expanded so the update only touches the addressed voxel. Aggregates
    /// of all inner nodes on the path are refreshed afterwards.
    pub fn update(&mut self, key: VoxelKey, update: NodeUpdate) -> LeafHandle {
        let tree_depth = self.tree_depth;
        let mut path = Vec::with_capacity(tree_depth as usize + 1);

        let (mut id, mut created) = match self.root {
            Some(root) => (root, false),
            None => {
                let root = self.alloc(self.new_leaf());
                self.root = Some(root);
                (root, true)
            }
        };
        path.push(id);

        for level in 0..tree_depth {
            let octant = key.child_index(level, tree_depth);
            let node = &self.nodes[id.index()];
            id = match node.child(octant) {
                Some(child) => {
                    created = false;
                    child
                }
                None if node.is_leaf() && !created => self.expand_node(id)[octant],
                None => {
                    let child = self.alloc(self.new_leaf());
                    self.nodes[id.index()].set_child(octant, child);
                    created = true;
                    child
                }
            };
            path.push(id);
        }

        let model = self.model;
        let cell = self.nodes[id.index()].cell_mut();
        match update {
            NodeUpdate::Observe(observation) => cell.fuse(observation, &model),
            NodeUpdate::AddLogOdds(delta) => cell.add_log_odds(delta, &model),
            NodeUpdate::SetLogOdds(value) => cell.set_log_odds(value, &model),
        }

        path.pop();
        for &ancestor in path.iter().rev() {
            self.refresh_inner(ancestor);
        }

        self.handle(id, key, tree_depth)
    }

    /// Find the node covering `key`, descending at most `depth` levels.
    ///
    /// Returns the first leaf met on the way, or the node reached at
    /// `depth`. `None` means the region is unknown.
    pub fn search(&self, key: VoxelKey, depth: u8) -> Option<LeafHandle> {
        let depth = depth.min(self.tree_depth);
        let mut id = self.root?;
        for level in 0..depth {
            match &self.nodes[id.index()] {
                OctreeNode::Leaf(_) => return Some(self.handle(id, key, level)),
                OctreeNode::Inner { children, .. } => {
                    id = children[key.child_index(level, self.tree_depth)]?;
                }
            }
        }
        Some(self.handle(id, key, depth))
    }

    /// Delete the node covering `key` at `depth` together with its subtree.
    ///
    /// Pruned leaves on the way are expanded first, so only the addressed
    /// region becomes unknown. Parents left without children are removed
    /// too. Returns false if the region was already unknown.
    pub fn delete(&mut self, key: VoxelKey, depth: u8) -> bool {
        let tree_depth = self.tree_depth;
        let depth = depth.min(tree_depth);
        let Some(mut id) = self.root else {
            return false;
        };

        let mut path = Vec::with_capacity(depth as usize + 1);
        path.push(id);
        for level in 0..depth {
            let octant = key.child_index(level, tree_depth);
            let node = &self.nodes[id.index()];
            id = match node.child(octant) {
                Some(child) => child,
                None if node.is_leaf() => self.expand_node(id)[octant],
                None => return false,
            };
            path.push(id);
        }

        self.release_subtree(id);

        let mut level = depth;
        while level > 0 {
            level -= 1;
            let parent = path[level as usize];
            self.nodes[parent.index()].take_child(key.child_index(level, tree_depth));
            if self.nodes[parent.index()].child_count() > 0 {
                for &ancestor in path[..=level as usize].iter().rev() {
                    self.refresh_inner(ancestor);
                }
                return true;
            }
            self.release(parent);
        }

        self.root = None;
        true
    }

    /// Expand every pruned leaf down to max depth. Returns the number of
    /// nodes expanded.
    ///
    /// Memory grows by eight nodes per expansion; a leaf near the root
    /// covers an enormous number of voxels.
    pub fn expand(&mut self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut expanded = 0;
        let mut stack = vec![(root, 0u8)];
        while let Some((id, depth)) = stack.pop() {
            if depth == self.tree_depth {
                continue;
            }
            let children = match self.nodes[id.index()].children() {
                Some(children) => children.iter().flatten().copied().collect::<Vec<_>>(),
                None => {
                    expanded += 1;
                    self.expand_node(id).to_vec()
                }
            };
            stack.extend(children.into_iter().map(|c| (c, depth + 1)));
        }
        log::debug!("Expanded {} nodes", expanded);
        expanded
    }

    /// Snap every node to the clamping bound on its side of the threshold.
    pub fn to_max_likelihood(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        let model = self.model;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id.index()];
            node.cell_mut().to_max_likelihood(&model);
            if let Some(children) = node.children() {
                stack.extend(children.iter().flatten());
            }
        }
    }

    /// Renumber the arena in pre-order and drop released slots.
    pub fn compact(&mut self) {
        let Some(root) = self.root else {
            self.clear();
            return;
        };
        let mut nodes = Vec::with_capacity(self.node_count());
        let new_root = self.compact_recursive(root, &mut nodes);
        log::debug!(
            "Compacted octree: {} slots -> {} nodes",
            self.nodes.len(),
            nodes.len()
        );
        self.nodes = nodes;
        self.free.clear();
        self.root = Some(new_root);
    }

    fn compact_recursive(&self, old_id: NodeId, out: &mut Vec<OctreeNode>) -> NodeId {
        let new_id = NodeId(out.len() as u32);
        let node = &self.nodes[old_id.index()];
        out.push(node.clone());

        if let Some(children) = node.children() {
            let mut remapped: ChildSlots = [None; 8];
            for (octant, child) in children.iter().enumerate() {
                if let Some(child) = child {
                    remapped[octant] = Some(self.compact_recursive(*child, out));
                }
            }
            if let OctreeNode::Inner { children, .. } = &mut out[new_id.index()] {
                *children = remapped;
            }
        }

        new_id
    }
}
