//! Tree compaction: collapse uniform sibling groups into one leaf.

use super::cell::OccupancyCell;
use super::node::{NodeId, OctreeNode};
use super::tree::OccupancyOctree;

impl OccupancyOctree {
    /// Collapse every inner node whose eight children are leaves with
    /// log-odds within the prune tolerance of each other.
    ///
    /// Runs post-order, so collapses cascade towards the root. The new leaf
    /// takes the largest child value, which is the inner node's aggregate,
    /// so queries at that node's depth or above see no change. Returns the
    /// number of collapsed nodes; a second call right after returns 0.
    pub fn prune(&mut self) -> usize {
        let Some(root) = self.root() else {
            return 0;
        };
        let before = self.node_count();
        let collapsed = self.prune_recursive(root);
        log::debug!(
            "Pruned {} inner nodes ({} -> {} nodes)",
            collapsed,
            before,
            self.node_count()
        );
        collapsed
    }

    fn prune_recursive(&mut self, id: NodeId) -> usize {
        let Some(children) = self.node(id).children().copied() else {
            return 0;
        };

        let mut collapsed = 0;
        for child in children.iter().flatten() {
            collapsed += self.prune_recursive(*child);
        }

        if self.try_collapse(id) {
            collapsed += 1;
        }
        collapsed
    }

    /// Collapse a single inner node if its children allow it.
    fn try_collapse(&mut self, id: NodeId) -> bool {
        let Some(children) = self.node(id).children().copied() else {
            return false;
        };

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for slot in children {
            let Some(child) = slot else {
                return false;
            };
            let OctreeNode::Leaf(cell) = self.node(child) else {
                return false;
            };
            min = min.min(cell.log_odds());
            max = max.max(cell.log_odds());
        }
        if max - min > self.prune_tolerance() {
            return false;
        }

        for child in children.iter().flatten() {
            self.release_subtree(*child);
        }
        *self.node_mut(id) = OctreeNode::Leaf(OccupancyCell::new(max));
        true
    }
}
