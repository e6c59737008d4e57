//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Cube of edge `size` centered on `center` (a node's extent).
    pub fn cube(center: Vec3, size: f32) -> Self {
        let half = Vec3::splat(size * 0.5);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if point is inside AABB (half-open: max faces excluded)
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmplt(self.max).all()
    }

    /// Check if two AABBs overlap with positive volume
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmplt(other.max).all() && self.max.cmpgt(other.min).all()
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Child octant for octree subdivision.
    /// index: 0-7 (bit 0 = x, bit 1 = y, bit 2 = z; set = upper half)
    pub fn child_octant(&self, index: usize) -> Aabb {
        let center = self.center();
        let quarter = self.size() * 0.25;
        let offset = Vec3::new(
            if index & 1 != 0 { quarter.x } else { -quarter.x },
            if index & 2 != 0 { quarter.y } else { -quarter.y },
            if index & 4 != 0 { quarter.z } else { -quarter.z },
        );
        let child_center = center + offset;
        Aabb::new(child_center - quarter, child_center + quarter)
    }
}
