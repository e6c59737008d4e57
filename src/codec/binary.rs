//! Compact body encoding: two bits per child.
//!
//! The body starts with one code byte for the root, followed by a 16-bit
//! child word for every subdivided node in pre-order. Octant `i` occupies
//! bits `2i..2i+2` of the word:
//!
//! - `00` no child (unknown space)
//! - `01` occupied leaf
//! - `10` free leaf
//! - `11` subdivided node, whose own word follows later in pre-order
//!
//! Leaf values are reduced to occupied/free. Decoded leaves take the upper or
//! lower clamping bound of the reading map's model.

use std::io::Read;

use super::{read_array, MAX_PREALLOC};
use crate::core::error::Error;
use crate::core::types::Result;
use crate::octree::cell::{OccupancyCell, OccupancyModel};
use crate::octree::node::{NodeId, OctreeNode};
use crate::octree::tree::OccupancyOctree;

const UNKNOWN: u8 = 0b00;
const OCCUPIED: u8 = 0b01;
const FREE: u8 = 0b10;
const INNER: u8 = 0b11;

fn node_code(tree: &OccupancyOctree, id: NodeId) -> u8 {
    let node = tree.node(id);
    if !node.is_leaf() {
        INNER
    } else if node.cell().is_occupied(tree.model()) {
        OCCUPIED
    } else {
        FREE
    }
}

/// Encode the tree body. Returns the bytes and the number of nodes written.
pub fn encode_body(tree: &OccupancyOctree) -> (Vec<u8>, u64) {
    let mut out = Vec::new();
    let Some(root) = tree.root() else {
        return (out, 0);
    };

    let code = node_code(tree, root);
    out.push(code);
    let mut count = 1;
    if code == INNER {
        count += write_children(tree, root, &mut out);
    }
    (out, count)
}

fn write_children(tree: &OccupancyOctree, id: NodeId, out: &mut Vec<u8>) -> u64 {
    let Some(children) = tree.node(id).children() else {
        return 0;
    };

    let mut word = 0u16;
    for (octant, child) in children.iter().enumerate() {
        if let Some(child) = child {
            word |= (node_code(tree, *child) as u16) << (2 * octant);
        }
    }
    out.extend_from_slice(&word.to_le_bytes());

    let mut count = 0;
    for child in children.iter().flatten() {
        count += 1;
        if !tree.node(*child).is_leaf() {
            count += write_children(tree, *child, out);
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

    let [code]: [u8; 1] = read_array(reader)?;
    let root = match code {
        OCCUPIED | FREE => tree.alloc(leaf_for(code, &model)),
        INNER => tree.alloc(OctreeNode::leaf(OccupancyCell::prior(&model))),
        _ => return Err(Error::format(format!("invalid root code {code:#04b}"))),
    };
    tree.set_root(Some(root));

    let mut decoded = 1u64;
    if code == INNER {
        read_children(reader, &mut tree, root, 0, &mut decoded)?;
    }

    if decoded != node_count {
        return Err(Error::format(format!(
            "header declares {node_count} nodes, body holds {decoded}"
        )));
    }
    Ok(tree)
}

fn leaf_for(code: u8, model: &OccupancyModel) -> OctreeNode {
    let value = if code == OCCUPIED { model.clamp_max } else { model.clamp_min };
    OctreeNode::leaf(OccupancyCell::new(value))
}

fn read_children<R: Read>(
    reader: &mut R,
    tree: &mut OccupancyOctree,
    id: NodeId,
    depth: u8,
    decoded: &mut u64,
) -> Result<()> {
    if depth >= tree.tree_depth() {
        return Err(Error::format(format!(
            "node at depth {depth} claims children below the tree depth {}",
            tree.tree_depth()
        )));
    }

    let word = u16::from_le_bytes(read_array(reader)?);
    if word == 0 {
        return Err(Error::format(format!("subdivided node at depth {depth} has no children")));
    }

    let model = *tree.model();
    let mut inner = Vec::new();
    for octant in 0..8 {
        let code = ((word >> (2 * octant)) & 0b11) as u8;
        let child = match code {
            UNKNOWN => continue,
            OCCUPIED | FREE => tree.alloc(leaf_for(code, &model)),
            _ => {
                let child = tree.alloc(OctreeNode::leaf(OccupancyCell::prior(&model)));
                inner.push(child);
                child
            }
        };
        tree.node_mut(id).set_child(octant, child);
        *decoded += 1;
    }

    for child in inner {
        read_children(reader, tree, child, depth + 1, decoded)?;
    }
    tree.refresh_inner(id);
    Ok(())
}
