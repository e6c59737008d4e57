//! Map configuration.
//!
//! Everything a map needs is held per instance: several maps with different
//! resolutions or sensor models can live side by side.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::key::MAX_TREE_DEPTH;
use crate::octree::cell::OccupancyParams;

/// Construction parameters of an [`OccupancyMap`](crate::OccupancyMap).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Edge length of a max-depth voxel in meters.
    pub resolution: f64,
    /// Number of levels below the root (1-16).
    pub tree_depth: u8,
    /// Optional extent (+-max_range on every axis) the map must cover.
    pub max_range: Option<f64>,
    /// Sensor model and clamping bounds.
    pub occupancy: OccupancyParams,
    /// Largest log-odds spread among eight siblings that still lets
    /// pruning merge them. 0.0 merges only identical values.
    pub prune_tolerance: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            resolution: 0.1,
            tree_depth: MAX_TREE_DEPTH,
            max_range: None,
            occupancy: OccupancyParams::default(),
            prune_tolerance: 0.0,
        }
    }
}

impl MapConfig {
    /// Default configuration at the given resolution.
    pub fn with_resolution(resolution: f64) -> Self {
        Self {
            resolution,
            ..Default::default()
        }
    }

    /// Configuration with the shallowest tree that covers +-`max_range`.
    pub fn with_max_range(resolution: f64, max_range: f64) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(Error::config(format!("resolution must be positive, got {resolution}")));
        }
        if !(max_range.is_finite() && max_range > 0.0) {
            return Err(Error::config(format!("max_range must be positive, got {max_range}")));
        }
        let half_cells = (max_range / resolution).ceil();
        let tree_depth = (1..=MAX_TREE_DEPTH)
            .find(|&d| (1u64 << (d - 1)) as f64 >= half_cells)
            .ok_or_else(|| {
                Error::config(format!(
                    "max_range {max_range} needs more than {MAX_TREE_DEPTH} levels at resolution {resolution}"
                ))
            })?;
        let config = Self {
            resolution,
            tree_depth,
            max_range: Some(max_range),
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Largest |coordinate| representable with this resolution and depth.
    pub fn coordinate_limit(&self) -> f64 {
        self.resolution * (1u64 << (self.tree_depth.clamp(1, MAX_TREE_DEPTH) - 1)) as f64
    }

    /// Check every parameter; errors are [`Error::Configuration`].
    pub fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(Error::config(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(1..=MAX_TREE_DEPTH).contains(&self.tree_depth) {
            return Err(Error::config(format!(
                "tree_depth must be in 1..={MAX_TREE_DEPTH}, got {}",
                self.tree_depth
            )));
        }
        if let Some(range) = self.max_range {
            if !(range.is_finite() && range > 0.0) {
                return Err(Error::config(format!("max_range must be positive, got {range}")));
            }
            if range > self.coordinate_limit() {
                return Err(Error::config(format!(
                    "max_range {range} exceeds the {} reachable with tree_depth {} at resolution {}",
                    self.coordinate_limit(),
                    self.tree_depth,
                    self.resolution
                )));
            }
        }
        if !(self.prune_tolerance.is_finite() && self.prune_tolerance >= 0.0) {
            return Err(Error::config(format!(
                "prune_tolerance must be non-negative, got {}",
                self.prune_tolerance
            )));
        }
        self.occupancy.validate()
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON and validate
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MapConfig::default();
        config.validate().unwrap();
        assert!((config.coordinate_limit() - 3276.8).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_resolution() {
        for resolution in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let config = MapConfig::with_resolution(resolution);
            assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        }
    }

    #[test]
    fn test_rejects_bad_depth() {
        for tree_depth in [0, 17] {
            let config = MapConfig { tree_depth, ..Default::default() };
            assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        }
    }

    #[test]
    fn test_range_consistency() {
        let config = MapConfig {
            resolution: 1.0,
            tree_depth: 4,
            max_range: Some(10.0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = MapConfig { max_range: Some(8.0), ..config };
        config.validate().unwrap();
    }

    #[test]
    fn test_with_max_range_picks_shallowest_depth() {
        let config = MapConfig::with_max_range(1.0, 8.0).unwrap();
        assert_eq!(config.tree_depth, 4);
        let config = MapConfig::with_max_range(1.0, 8.5).unwrap();
        assert_eq!(config.tree_depth, 5);
        let config = MapConfig::with_max_range(0.1, 3000.0).unwrap();
        assert_eq!(config.tree_depth, 16);
        assert!(MapConfig::with_max_range(0.1, 4000.0).is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("map.json");
        let config = MapConfig {
            resolution: 0.05,
            prune_tolerance: 0.01,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(MapConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MapConfig = serde_json::from_str(r#"{ "resolution": 0.2 }"#).unwrap();
        assert_eq!(config.resolution, 0.2);
        assert_eq!(config.tree_depth, 16);
        assert_eq!(config.occupancy, OccupancyParams::default());
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "resolution": -1.0 }"#).unwrap();
        assert!(matches!(MapConfig::load(&path), Err(Error::Configuration(_))));
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(MapConfig::load(&path), Err(Error::Json(_))));
    }
}
