//! Full body encoding: every node's log-odds at half precision.
//!
//! Nodes are written in pre-order as `value: f16 (LE)` followed by an 8-bit
//! child mask; the present children follow in octant order. Round-trips are
//! exact up to `f16` quantization (about 1e-3 in log-odds near the clamping
//! bounds).

use std::io::Read;

use half::f16;

use super::{read_array, MAX_PREALLOC};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::octree::cell::{OccupancyCell, OccupancyModel};
use crate::octree::node::{NodeId, OctreeNode};
use crate::octree::tree::OccupancyOctree;

/// Encode the tree body. Returns the bytes and the number of nodes written.
pub fn encode_body(tree: &OccupancyOctree) -> (Vec<u8>, u64) {
    let mut out = Vec::with_capacity(tree.node_count() * 3);
    let count = match tree.root() {
        Some(root) => write_node(tree, root, &mut out),
        None => 0,
    };
    (out, count)
}

fn write_node(tree: &OccupancyOctree, id: NodeId, out: &mut Vec<u8>) -> u64 {
    let node = tree.node(id);
    let value = f16::from_f32(node.cell().log_odds());
    out.extend_from_slice(&value.to_le_bytes());
    out.push(node.child_mask());

    let mut count = 1;
    if let Some(children) = node.children() {
        for child in children.iter().flatten() {
            count += write_node(tree, *child, out);
        }
    }
    count
}

/// Decode a body of `node_count` nodes into a fresh tree.
pub fn decode_body<R: Read>(
    reader: &mut R,
    tree_depth: u8,
    node_count: u64,
    model: OccupancyModel,
    prune_tolerance: f32,
) -> Result<OccupancyOctree> {
    // The count is untrusted until the body confirms it
    let capacity = node_count.min(MAX_PREALLOC) as usize;
    let mut tree = OccupancyOctree::with_capacity(tree_depth, model, prune_tolerance, capacity);
    if node_count == 0 {
        return Ok(tree);
    }

    let mut decoded = 0u64;
    let root = read_node(reader, &mut tree, 0, &mut decoded)?;
    tree.set_root(Some(root));

    if decoded != node_count {
        return Err(Error::format(format!(
            "header declares {node_count} nodes, body holds {decoded}"
        )));
    }
    Ok(tree)
}

fn read_node<R: Read>(
    reader: &mut R,
    tree: &mut OccupancyOctree,
    depth: u8,
    decoded: &mut u64,
) -> Result<NodeId> {
    let value = f16::from_le_bytes(read_array(reader)?).to_f32();
    if !value.is_finite() {
        return Err(Error::format(format!("non-finite log-odds at depth {depth}")));
    }
    let [mask]: [u8; 1] = read_array(reader)?;
    if mask != 0 && depth >= tree.tree_depth() {
        return Err(Error::format(format!(
            "node at depth {depth} claims children below the tree depth {}",
            tree.tree_depth()
        )));
    }

    let cell = OccupancyCell::new(tree.model().clamp(value));
    let id = tree.alloc(OctreeNode::leaf(cell));
    *decoded += 1;

    for octant in 0..8 {
        if mask & (1 << octant) != 0 {
            let child = read_node(reader, tree, depth + 1, decoded)?;
            tree.node_mut(id).set_child(octant, child);
        }
    }
    if mask != 0 {
        tree.refresh_inner(id);
    }
    Ok(id)
}
