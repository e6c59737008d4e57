//! Occupancy map: the public entry point.
//!
//! [`OccupancyMap`] ties coordinate mapping, the octree and the codec
//! together. All mutating operations take `&mut self`, so a map shared
//! behind a lock naturally follows single-writer / multiple-reader rules.
//!
//! # Example
//! ```
//! use glam::Vec3;
//! use occtree::OccupancyMap;
//!
//! let mut map = OccupancyMap::new(0.1)?;
//! map.update_node(Vec3::ZERO, true)?;
//!
//! let hit = map.search(Vec3::ZERO)?.expect("just observed");
//! assert!(hit.occupancy_probability() > 0.5);
//! assert!(map.search(Vec3::splat(5.0))?.is_none());
//! # Ok::<(), occtree::Error>(())
//! ```

use std::io::{Read, Write};
use std::path::Path;

use rayon::prelude::*;

use crate::codec::{self, Decoded, StreamFormat};
use crate::core::config::MapConfig;
use crate::core::error::Error;
use crate::core::types::{Result, Vec3};
use crate::math::aabb::Aabb;
use crate::math::key::{KeyMapper, VoxelKey};
use crate::octree::cell::{Observation, OccupancyCell};
use crate::octree::tree::{LeafHandle, NodeUpdate, OccupancyOctree};
use crate::storage::disk_io;

/// A known region of the map as seen by [`OccupancyMap::leaves`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelInfo {
    /// Center of the leaf in map coordinates.
    pub center: Vec3,
    /// Edge length of the leaf.
    pub size: f64,
    pub depth: u8,
    pub key: VoxelKey,
    pub cell: OccupancyCell,
}

impl VoxelInfo {
    pub fn bounds(&self) -> Aabb {
        Aabb::cube(self.center, self.size as f32)
    }
}

/// Probabilistic 3D occupancy map.
#[derive(Debug, Clone)]
pub struct OccupancyMap {
    config: MapConfig,
    mapper: KeyMapper,
    tree: OccupancyOctree,
}

impl OccupancyMap {
    /// Create an empty map with default parameters at `resolution`.
    pub fn new(resolution: f64) -> Result<Self> {
        Self::with_config(MapConfig::with_resolution(resolution))
    }

    /// Create an empty map from a full configuration.
    pub fn with_config(config: MapConfig) -> Result<Self> {
        config.validate()?;
        let tree = OccupancyOctree::new(
            config.tree_depth,
            config.occupancy.model(),
            config.prune_tolerance,
        );
        Ok(Self {
            mapper: KeyMapper::new(config.resolution, config.tree_depth),
            tree,
            config,
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn resolution(&self) -> f64 {
        self.config.resolution
    }

    pub fn tree_depth(&self) -> u8 {
        self.config.tree_depth
    }

    /// Underlying octree, for traversal or statistics.
    pub fn octree(&self) -> &OccupancyOctree {
        &self.tree
    }

    // --- Coordinate mapping ---

    pub fn point_to_key(&self, point: Vec3) -> Result<VoxelKey> {
        self.mapper.point_to_key(point)
    }

    /// Center of the max-depth voxel `key`.
    pub fn key_to_point(&self, key: VoxelKey) -> Vec3 {
        self.mapper.key_to_point(key)
    }

    /// Center of the node at `depth` containing `key`.
    pub fn key_to_point_at_depth(&self, key: VoxelKey, depth: u8) -> Vec3 {
        self.mapper.key_to_point_at_depth(key, depth)
    }

    /// Edge length of a node at `depth`.
    pub fn node_size(&self, depth: u8) -> f64 {
        self.mapper.node_size(depth)
    }

    /// Spatial extent of the node at `depth` containing `key`.
    pub fn node_bounds(&self, key: VoxelKey, depth: u8) -> Aabb {
        Aabb::cube(
            self.mapper.key_to_point_at_depth(key, depth),
            self.mapper.node_size(depth) as f32,
        )
    }

    fn check_depth(&self, depth: u8) -> Result<()> {
        if depth > self.tree_depth() {
            return Err(Error::InvalidDepth {
                depth,
                max: self.tree_depth(),
            });
        }
        Ok(())
    }

    // --- Updates ---

    /// Integrate one observation at `point`.
    pub fn update_node(&mut self, point: Vec3, occupied: bool) -> Result<LeafHandle> {
        let key = self.mapper.point_to_key(point)?;
        Ok(self.tree.update(key, Observation::from(occupied).into()))
    }

    /// Add a raw log-odds increment at `point`.
    pub fn update_node_log_odds(&mut self, point: Vec3, delta: f32) -> Result<LeafHandle> {
        let key = self.mapper.point_to_key(point)?;
        Ok(self.tree.update(key, NodeUpdate::AddLogOdds(delta)))
    }

    /// Overwrite the log-odds value at `point` (clamped).
    pub fn set_node_value(&mut self, point: Vec3, log_odds: f32) -> Result<LeafHandle> {
        let key = self.mapper.point_to_key(point)?;
        Ok(self.tree.update(key, NodeUpdate::SetLogOdds(log_odds)))
    }

    /// Apply an update to a voxel addressed by key.
    pub fn update_key(&mut self, key: VoxelKey, update: NodeUpdate) -> LeafHandle {
        self.tree.update(key, update)
    }

    /// Integrate the same observation at many points.
    ///
    /// Keys are computed in parallel first; if any point is out of range the
    /// whole batch is rejected and the map is left untouched.
    pub fn update_points(&mut self, points: &[Vec3], occupied: bool) -> Result<usize> {
        let mapper = self.mapper;
        let keys: Vec<VoxelKey> = points
            .par_iter()
            .map(|p| mapper.point_to_key(*p))
            .collect::<Result<_>>()?;

        let update = NodeUpdate::Observe(Observation::from(occupied));
        for key in &keys {
            self.tree.update(*key, update);
        }
        log::debug!("Integrated {} {} points", keys.len(), if occupied { "occupied" } else { "free" });
        Ok(keys.len())
    }

    // --- Queries ---

    /// Look up `point` at full resolution. `None` means unknown space.
    pub fn search(&self, point: Vec3) -> Result<Option<LeafHandle>> {
        let key = self.mapper.point_to_key(point)?;
        Ok(self.tree.search(key, self.tree_depth()))
    }

    /// Look up `point`, descending at most `depth` levels (0 = root).
    pub fn search_at_depth(&self, point: Vec3, depth: u8) -> Result<Option<LeafHandle>> {
        self.check_depth(depth)?;
        let key = self.mapper.point_to_key(point)?;
        Ok(self.tree.search(key, depth))
    }

    pub fn search_key(&self, key: VoxelKey) -> Option<LeafHandle> {
        self.tree.search(key, self.tree_depth())
    }

    /// Iterate over all known leaves with their metric position and size.
    pub fn leaves(&self) -> impl Iterator<Item = VoxelInfo> + '_ {
        self.tree.leaves().map(|leaf| VoxelInfo {
            center: self.mapper.key_to_point_at_depth(leaf.key, leaf.depth),
            size: self.mapper.node_size(leaf.depth),
            depth: leaf.depth,
            key: leaf.key,
            cell: leaf.cell,
        })
    }

    /// Leaves whose extent overlaps `bounds`.
    pub fn leaves_in_box(&self, bounds: Aabb) -> impl Iterator<Item = VoxelInfo> + '_ {
        self.leaves().filter(move |v| v.bounds().intersects(&bounds))
    }

    /// Bounding box of all known space, or `None` for an empty map.
    pub fn bounding_box(&self) -> Option<Aabb> {
        self.leaves().map(|v| v.bounds()).reduce(|a, b| a.merged(&b))
    }

    /// Total volume of known space in cubic meters.
    pub fn known_volume(&self) -> f64 {
        self.leaves().map(|v| v.size.powi(3)).sum()
    }

    pub fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    pub fn leaf_count(&self) -> usize {
        self.tree.leaf_count()
    }

    /// Approximate heap usage of the tree in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.tree.memory_usage()
    }

    // --- Structure ---

    /// Remove the voxel at `point`. Returns false if it was unknown.
    pub fn delete_node(&mut self, point: Vec3) -> Result<bool> {
        self.delete_node_at_depth(point, self.tree_depth())
    }

    /// Remove the node at `depth` containing `point`, with its subtree.
    pub fn delete_node_at_depth(&mut self, point: Vec3, depth: u8) -> Result<bool> {
        self.check_depth(depth)?;
        let key = self.mapper.point_to_key(point)?;
        Ok(self.tree.delete(key, depth))
    }

    /// Collapse uniform subtrees. Returns the number of collapsed nodes.
    ///
    /// The arena is compacted afterwards once released slots outnumber live
    /// nodes.
    pub fn prune(&mut self) -> usize {
        let collapsed = self.tree.prune();
        if self.tree.free_slots() > self.tree.node_count() {
            self.tree.compact();
        }
        collapsed
    }

    /// Undo all pruning down to max depth.
    pub fn expand(&mut self) -> usize {
        self.tree.expand()
    }

    /// Snap every node to the clamping bound on its side of the threshold.
    pub fn to_max_likelihood(&mut self) {
        self.tree.to_max_likelihood();
    }

    /// Forget all observations.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    // --- Persistence ---

    /// Serialize the map into a buffer.
    pub fn to_bytes(&self, format: StreamFormat) -> Result<Vec<u8>> {
        codec::encode_to_vec(&self.tree, self.resolution(), format)
    }

    /// Serialize the map into a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W, format: StreamFormat) -> Result<()> {
        codec::encode(&self.tree, self.resolution(), format, writer)
    }

    fn from_decoded(decoded: Decoded, template: &MapConfig) -> Result<Self> {
        let config = MapConfig {
            resolution: decoded.header.resolution,
            tree_depth: decoded.header.tree_depth,
            max_range: None,
            ..template.clone()
        };
        config.validate()?;
        Ok(Self {
            mapper: KeyMapper::new(config.resolution, config.tree_depth),
            tree: decoded.tree,
            config,
        })
    }

    /// Deserialize a complete buffer in either encoding.
    ///
    /// Resolution and depth come from the stream; sensor model and prune
    /// tolerance from `config`.
    pub fn from_bytes(bytes: &[u8], config: &MapConfig) -> Result<Self> {
        config.occupancy.validate()?;
        let decoded = codec::decode_from_slice(
            bytes,
            config.occupancy.model(),
            config.prune_tolerance,
        )
        .inspect_err(|e| log::warn!("Rejected map stream: {}", e))?;
        Self::from_decoded(decoded, config)
    }

    /// Deserialize one map from a reader, leaving any following data unread.
    pub fn read_from<R: Read>(reader: &mut R, config: &MapConfig) -> Result<Self> {
        config.occupancy.validate()?;
        let decoded = codec::decode(reader, config.occupancy.model(), config.prune_tolerance)
            .inspect_err(|e| log::warn!("Rejected map stream: {}", e))?;
        Self::from_decoded(decoded, config)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        disk_io::write_atomic(path, bytes)?;
        log::info!(
            "Wrote {} nodes ({} bytes) to {}",
            self.node_count(),
            bytes.len(),
            path.display()
        );
        Ok(())
    }

    /// Write the compact occupied/free encoding to `path`.
    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes(StreamFormat::Binary)?;
        self.write_file(path.as_ref(), &bytes)
    }

    /// Write the full log-odds encoding to `path`.
    pub fn write_full(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes(StreamFormat::Full)?;
        self.write_file(path.as_ref(), &bytes)
    }

    /// Write the full encoding, LZ4-compressed.
    pub fn write_compressed(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = disk_io::compress(&self.to_bytes(StreamFormat::Full)?);
        self.write_file(path.as_ref(), &bytes)
    }

    /// Read a map file written by [`write_binary`](Self::write_binary) or
    /// [`write_full`](Self::write_full) with default parameters.
    pub fn read_binary(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_with_config(path, &MapConfig::default())
    }

    /// Read a map file using `config` for the sensor model.
    pub fn read_with_config(path: impl AsRef<Path>, config: &MapConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let map = Self::from_bytes(&bytes, config)?;
        log::info!("Read {} nodes from {}", map.node_count(), path.display());
        Ok(map)
    }

    /// Read a file written by [`write_compressed`](Self::write_compressed).
    pub fn read_compressed(path: impl AsRef<Path>, config: &MapConfig) -> Result<Self> {
        let bytes = disk_io::decompress(&std::fs::read(path.as_ref())?)?;
        Self::from_bytes(&bytes, config)
    }

    /// Replace this map with the one stored at `path`, keeping the current
    /// sensor model. On any error `self` is unchanged.
    pub fn reload_from(&mut self, path: impl AsRef<Path>) -> Result<()> {
        *self = Self::read_with_config(path, &self.config)?;
        Ok(())
    }
}
