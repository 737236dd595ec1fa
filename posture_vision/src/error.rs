// THEORY:
// Errors only exist at the edges of the engine. Geometry, feature extraction and
// classification are total functions: a degenerate input yields an absent
// measurement, never an error. What can fail is reading frames, loading or
// patching configuration, and talking to the outside world.

use std::path::PathBuf;

use thiserror::Error;

use crate::core_modules::classifier::ThresholdKey;

/// Failures while pulling frames from a recording or a live producer.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read frame stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load segmentation mask {path}: {source}")]
    Mask {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid frame on line {line}: {reason}")]
    InvalidFrame { line: usize, reason: String },
}

impl SourceError {
    /// True when the stream itself is gone. Anything else spoils a single frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Io(_))
    }
}

/// Configuration that cannot be loaded or would leave the thresholds inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("inconsistent {segment} thresholds: {detail}")]
    Inconsistent { segment: &'static str, detail: String },

    #[error("threshold {key} must be a finite number")]
    NonFinite { key: ThresholdKey },

    #[error("unknown threshold key `{0}`")]
    UnknownKey(String),

    #[error("invalid setting {name}: {detail}")]
    InvalidSetting { name: &'static str, detail: String },
}

/// A failed hand-off to an external channel. Never retried; the engine logs it and moves on.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("delivery failed: {0}")]
    Delivery(String),
}
