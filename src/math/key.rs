//! Discrete voxel addressing.
//!
//! A [`VoxelKey`] holds one integer per axis. The key space spans
//! `0..2^tree_depth` per axis with the world origin sitting at
//! `2^(tree_depth - 1)`, so `key = floor(c / resolution) + offset`.
//! Reading the key bits from the most significant end gives the octant
//! path from the root down to the voxel.

use crate::core::error::Error;
use crate::core::types::{Result, Vec3};

/// Deepest tree supported by 16-bit keys.
pub const MAX_TREE_DEPTH: u8 = 16;

/// Integer voxel address at maximum depth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoxelKey(pub [u16; 3]);

impl VoxelKey {
    pub const fn new(x: u16, y: u16, z: u16) -> Self {
        Self([x, y, z])
    }

    /// Octant index (0-7) of the child to descend into below `level`.
    ///
    /// Bit 0 = x, bit 1 = y, bit 2 = z; a set bit selects the upper half.
    #[inline]
    pub fn child_index(&self, level: u8, tree_depth: u8) -> usize {
        debug_assert!(level < tree_depth);
        let shift = tree_depth - 1 - level;
        let bit = |v: u16| ((v >> shift) & 1) as usize;
        bit(self.0[0]) | (bit(self.0[1]) << 1) | (bit(self.0[2]) << 2)
    }

    /// Key of the child `octant` of the node at `level` whose key is `self`.
    ///
    /// `self` must have its bits below `level` cleared.
    #[inline]
    pub fn child_key(&self, octant: usize, level: u8, tree_depth: u8) -> VoxelKey {
        let shift = tree_depth - 1 - level;
        let mut key = *self;
        for (axis, k) in key.0.iter_mut().enumerate() {
            if octant & (1 << axis) != 0 {
                *k |= 1 << shift;
            }
        }
        key
    }

    /// Key of the node at `depth` that contains this key, with all bits
    /// below that depth cleared.
    pub fn at_depth(&self, depth: u8, tree_depth: u8) -> VoxelKey {
        debug_assert!(depth <= tree_depth);
        let diff = (tree_depth - depth) as u32;
        let mask = u16::MAX.checked_shl(diff).unwrap_or(0);
        VoxelKey([self.0[0] & mask, self.0[1] & mask, self.0[2] & mask])
    }
}

/// Point <-> key conversion for one resolution and tree depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyMapper {
    resolution: f64,
    tree_depth: u8,
    /// `2^(tree_depth - 1)`, the key of the cell whose lower corner is the origin.
    max_val: i64,
}

impl KeyMapper {
    /// Callers validate `resolution > 0` and `1 <= tree_depth <= 16`.
    pub fn new(resolution: f64, tree_depth: u8) -> Self {
        debug_assert!(resolution > 0.0);
        debug_assert!((1..=MAX_TREE_DEPTH).contains(&tree_depth));
        Self {
            resolution,
            tree_depth,
            max_val: 1i64 << (tree_depth - 1),
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn tree_depth(&self) -> u8 {
        self.tree_depth
    }

    /// Largest |coordinate| the key space can represent.
    pub fn max_coordinate(&self) -> f64 {
        self.max_val as f64 * self.resolution
    }

    /// Edge length of a node at `depth` (depth 0 is the root).
    pub fn node_size(&self, depth: u8) -> f64 {
        self.resolution * (1u64 << (self.tree_depth - depth.min(self.tree_depth))) as f64
    }

    fn axis_to_key(&self, axis: char, value: f32) -> Result<u16> {
        let cell = (value as f64 / self.resolution).floor();
        let limit = self.max_val as f64;
        // Negated comparison also rejects NaN.
        if !(cell >= -limit && cell < limit) {
            return Err(Error::InvalidCoordinate {
                axis,
                value,
                limit: self.max_coordinate(),
            });
        }
        Ok((cell as i64 + self.max_val) as u16)
    }

    /// Map a point to the key of the max-depth voxel containing it.
    pub fn point_to_key(&self, point: Vec3) -> Result<VoxelKey> {
        Ok(VoxelKey([
            self.axis_to_key('x', point.x)?,
            self.axis_to_key('y', point.y)?,
            self.axis_to_key('z', point.z)?,
        ]))
    }

    /// Center of the max-depth voxel addressed by `key`.
    pub fn key_to_point(&self, key: VoxelKey) -> Vec3 {
        self.key_to_point_at_depth(key, self.tree_depth)
    }

    /// Center of the node at `depth` that contains `key`.
    pub fn key_to_point_at_depth(&self, key: VoxelKey, depth: u8) -> Vec3 {
        let depth = depth.min(self.tree_depth);
        let diff = (self.tree_depth - depth) as u32;
        let size = self.node_size(depth);
        let axis = |k: u16| {
            let cell = ((k as i64) >> diff << diff) - self.max_val;
            let offset = cell as f64 * self.resolution;
            (offset + size * 0.5) as f32
        };
        Vec3::new(axis(key.0[0]), axis(key.0[1]), axis(key.0[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_key() {
        let mapper = KeyMapper::new(0.1, 16);
        let key = mapper.point_to_key(Vec3::ZERO).unwrap();
        assert_eq!(key, VoxelKey::new(32768, 32768, 32768));

        let key = mapper.point_to_key(Vec3::splat(-0.05)).unwrap();
        assert_eq!(key, VoxelKey::new(32767, 32767, 32767));
    }

    #[test]
    fn test_boundary_uses_floor() {
        let mapper = KeyMapper::new(0.5, 16);
        let on_edge = mapper.point_to_key(Vec3::new(0.5, -0.5, 1.0)).unwrap();
        assert_eq!(on_edge, VoxelKey::new(32769, 32767, 32770));
    }

    #[test]
    fn test_key_to_point_is_voxel_center() {
        let mapper = KeyMapper::new(0.25, 16);
        let p = Vec3::new(1.1, -2.3, 0.01);
        let key = mapper.point_to_key(p).unwrap();
        let center = mapper.key_to_point(key);
        assert!((center - p).abs().max_element() <= 0.125 + 1e-6);
        assert_eq!(center, Vec3::new(1.125, -2.375, 0.125));
        // Idempotent
        assert_eq!(mapper.point_to_key(center).unwrap(), key);
        assert_eq!(mapper.key_to_point(mapper.point_to_key(center).unwrap()), center);
    }

    #[test]
    fn test_out_of_range() {
        let mapper = KeyMapper::new(1.0, 16);
        assert!(mapper.point_to_key(Vec3::new(32767.5, 0.0, 0.0)).is_ok());
        assert!(matches!(
            mapper.point_to_key(Vec3::new(32768.0, 0.0, 0.0)),
            Err(Error::InvalidCoordinate { axis: 'x', .. })
        ));
        assert!(mapper.point_to_key(Vec3::new(0.0, -32768.0, 0.0)).is_ok());
        assert!(mapper.point_to_key(Vec3::new(0.0, -32769.0, 0.0)).is_err());
        assert!(matches!(
            mapper.point_to_key(Vec3::new(0.0, 0.0, f32::NAN)),
            Err(Error::InvalidCoordinate { axis: 'z', .. })
        ));
    }

    #[test]
    fn test_shallow_tree_range() {
        let mapper = KeyMapper::new(1.0, 4);
        assert_eq!(mapper.max_coordinate(), 8.0);
        assert_eq!(mapper.point_to_key(Vec3::splat(-8.0)).unwrap(), VoxelKey::new(0, 0, 0));
        assert_eq!(mapper.point_to_key(Vec3::splat(7.9)).unwrap(), VoxelKey::new(15, 15, 15));
        assert!(mapper.point_to_key(Vec3::splat(8.0)).is_err());
    }

    #[test]
    fn test_child_index_follows_sign() {
        let mapper = KeyMapper::new(1.0, 16);
        let upper = mapper.point_to_key(Vec3::new(0.5, -0.5, 0.5)).unwrap();
        // Root split is at the origin: x upper, y lower, z upper
        assert_eq!(upper.child_index(0, 16), 0b101);
        let lower = mapper.point_to_key(Vec3::splat(-0.5)).unwrap();
        assert_eq!(lower.child_index(0, 16), 0);
    }

    #[test]
    fn test_child_key_and_at_depth() {
        let key = VoxelKey::new(0b1010, 0b0110, 0b1111);
        let tree_depth = 4;
        let mut rebuilt = VoxelKey::default();
        for level in 0..tree_depth {
            let octant = key.child_index(level, tree_depth);
            rebuilt = rebuilt.child_key(octant, level, tree_depth);
            assert_eq!(rebuilt, key.at_depth(level + 1, tree_depth));
        }
        assert_eq!(rebuilt, key);
        assert_eq!(key.at_depth(0, tree_depth), VoxelKey::default());
        assert_eq!(key.at_depth(2, tree_depth), VoxelKey::new(0b1000, 0b0100, 0b1100));
    }

    #[test]
    fn test_key_to_point_at_depth() {
        let mapper = KeyMapper::new(1.0, 16);
        let key = mapper.point_to_key(Vec3::new(0.5, 0.5, 0.5)).unwrap();
        // Depth 15 nodes are 2m wide; the one containing (0.5, 0.5, 0.5) spans [0, 2)
        assert_eq!(mapper.key_to_point_at_depth(key, 15), Vec3::splat(1.0));
        assert_eq!(mapper.node_size(15), 2.0);
        // Root is centered on the origin
        assert_eq!(mapper.key_to_point_at_depth(key, 0), Vec3::ZERO);
    }
}
