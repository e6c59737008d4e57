//! Per-voxel occupancy value and the log-odds fusion rule.
//!
//! Every node stores one log-odds value `l = ln(p / (1 - p))`. Observations
//! are fused additively and the result is clamped, so no sequence of updates
//! can drive a voxel to absolute certainty.

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Convert a probability to log-odds.
#[inline]
pub fn logodds(probability: f64) -> f32 {
    (probability / (1.0 - probability)).ln() as f32
}

/// Convert log-odds back to a probability.
#[inline]
pub fn probability(log_odds: f32) -> f64 {
    1.0 - 1.0 / (1.0 + (log_odds as f64).exp())
}

/// Adjacent `f32` one step towards +inf (`up`) or -inf.
fn step_f32(x: f32, up: bool) -> f32 {
    if x == 0.0 {
        let tiny = f32::from_bits(1);
        return if up { tiny } else { -tiny };
    }
    let bits = x.to_bits();
    if (x > 0.0) == up {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

/// Log-odds of a clamping bound, rounded inwards so that converting back
/// never crosses `p`: at or below it for an upper bound, at or above it for
/// a lower bound.
fn clamp_logodds(p: f64, upper: bool) -> f32 {
    let mut l = logodds(p);
    while (upper && probability(l) > p) || (!upper && probability(l) < p) {
        l = step_f32(l, !upper);
    }
    l
}

/// A binary sensor observation for one voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Observation {
    Occupied,
    Free,
}

impl From<bool> for Observation {
    fn from(occupied: bool) -> Self {
        if occupied { Self::Occupied } else { Self::Free }
    }
}

/// Sensor model and clamping bounds, expressed as probabilities.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyParams {
    /// Probability assigned to an "occupied" observation.
    pub prob_hit: f64,
    /// Probability assigned to a "free" observation.
    pub prob_miss: f64,
    /// Lower clamping bound.
    pub clamping_thres_min: f64,
    /// Upper clamping bound.
    pub clamping_thres_max: f64,
    /// Values at or above this probability count as occupied.
    pub occupancy_thres: f64,
    /// Value of a freshly created voxel before its first observation.
    pub prior: f64,
}

impl Default for OccupancyParams {
    fn default() -> Self {
        Self {
            prob_hit: 0.7,
            prob_miss: 0.4,
            clamping_thres_min: 0.1192,
            clamping_thres_max: 0.97,
            occupancy_thres: 0.5,
            prior: 0.5,
        }
    }
}

impl OccupancyParams {
    /// Check ranges and ordering of all parameters.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("prob_hit", self.prob_hit),
            ("prob_miss", self.prob_miss),
            ("clamping_thres_min", self.clamping_thres_min),
            ("clamping_thres_max", self.clamping_thres_max),
            ("occupancy_thres", self.occupancy_thres),
            ("prior", self.prior),
        ];
        for (name, p) in fields {
            if !(p > 0.0 && p < 1.0) {
                return Err(Error::config(format!("{name} must lie in (0, 1), got {p}")));
            }
        }
        if self.prob_hit <= 0.5 {
            return Err(Error::config(format!("prob_hit must exceed 0.5, got {}", self.prob_hit)));
        }
        if self.prob_miss >= 0.5 {
            return Err(Error::config(format!("prob_miss must be below 0.5, got {}", self.prob_miss)));
        }
        if self.clamping_thres_min >= self.clamping_thres_max {
            return Err(Error::config(format!(
                "clamping_thres_min ({}) must be below clamping_thres_max ({})",
                self.clamping_thres_min, self.clamping_thres_max
            )));
        }
        if self.prior < self.clamping_thres_min || self.prior > self.clamping_thres_max {
            return Err(Error::config(format!(
                "prior {} lies outside the clamping range [{}, {}]",
                self.prior, self.clamping_thres_min, self.clamping_thres_max
            )));
        }
        if self.occupancy_thres < self.clamping_thres_min
            || self.occupancy_thres > self.clamping_thres_max
        {
            return Err(Error::config(format!(
                "occupancy_thres {} lies outside the clamping range [{}, {}]",
                self.occupancy_thres, self.clamping_thres_min, self.clamping_thres_max
            )));
        }
        Ok(())
    }

    /// Precompute the log-odds form used on the update path.
    pub fn model(&self) -> OccupancyModel {
        OccupancyModel {
            hit: logodds(self.prob_hit),
            miss: logodds(self.prob_miss),
            clamp_min: clamp_logodds(self.clamping_thres_min, false),
            clamp_max: clamp_logodds(self.clamping_thres_max, true),
            occupancy_thres: logodds(self.occupancy_thres),
            prior: logodds(self.prior),
        }
    }
}

/// Log-odds form of [`OccupancyParams`].
///
/// `miss` is negative, so both observation kinds are fused by addition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OccupancyModel {
    pub hit: f32,
    pub miss: f32,
    pub clamp_min: f32,
    pub clamp_max: f32,
    pub occupancy_thres: f32,
    pub prior: f32,
}

impl Default for OccupancyModel {
    fn default() -> Self {
        OccupancyParams::default().model()
    }
}

impl OccupancyModel {
    /// Log-odds increment for an observation.
    #[inline]
    pub fn delta(&self, observation: Observation) -> f32 {
        match observation {
            Observation::Occupied => self.hit,
            Observation::Free => self.miss,
        }
    }

    #[inline]
    pub fn clamp(&self, log_odds: f32) -> f32 {
        log_odds.clamp(self.clamp_min, self.clamp_max)
    }
}

/// Occupancy state of a single node, stored as log-odds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OccupancyCell {
    log_odds: f32,
}

impl OccupancyCell {
    /// Create a cell holding the given log-odds value, unclamped.
    pub const fn new(log_odds: f32) -> Self {
        Self { log_odds }
    }

    /// Fresh cell at the model's prior.
    pub fn prior(model: &OccupancyModel) -> Self {
        Self::new(model.prior)
    }

    /// Raw log-odds value.
    #[inline]
    pub fn log_odds(&self) -> f32 {
        self.log_odds
    }

    /// Occupancy probability, the logistic transform of the log-odds.
    #[inline]
    pub fn occupancy_probability(&self) -> f64 {
        probability(self.log_odds)
    }

    /// Fuse a binary observation.
    pub fn fuse(&mut self, observation: Observation, model: &OccupancyModel) {
        self.add_log_odds(model.delta(observation), model);
    }

    /// Add an arbitrary log-odds increment, then clamp.
    pub fn add_log_odds(&mut self, delta: f32, model: &OccupancyModel) {
        self.log_odds = model.clamp(self.log_odds + delta);
    }

    /// Overwrite the value, clamped to the model bounds.
    pub fn set_log_odds(&mut self, value: f32, model: &OccupancyModel) {
        self.log_odds = model.clamp(value);
    }

    /// True if the value is at or above the occupancy threshold.
    #[inline]
    pub fn is_occupied(&self, model: &OccupancyModel) -> bool {
        self.log_odds >= model.occupancy_thres
    }

    /// Snap to the clamping bound on this cell's side of the threshold.
    pub fn to_max_likelihood(&mut self, model: &OccupancyModel) {
        self.log_odds = if self.is_occupied(model) {
            model.clamp_max
        } else {
            model.clamp_min
        };
    }
}
