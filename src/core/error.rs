//! Error types for the occupancy octree

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// Point outside the range the key space can address.
    #[error("invalid coordinate: {axis} = {value} is outside +-{limit}")]
    InvalidCoordinate {
        axis: char,
        value: f32,
        limit: f64,
    },

    #[error("invalid depth {depth}: tree depth is {max}")]
    InvalidDepth { depth: u8, max: u8 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
