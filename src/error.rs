use std::fmt;

use crate::streaming::types::TileKey;

#[derive(Debug)]
pub enum ConfigError {
    MissingHeightSampler,
    InvalidTileSize(f64),
    InvalidResolution(u32),
    InvalidRadius(i32),
    RetainRadiusTooSmall { load: i32, drop: i32 },
    InvalidCategory { name: String, reason: &'static str },
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeightSampler => {
                write!(f, "no height sampler supplied; one is required at construction")
            }
            Self::InvalidTileSize(ts) => write!(f, "tile size must be finite and > 0, got {ts}"),
            Self::InvalidResolution(r) => write!(f, "tile resolution must be >= 1, got {r}"),
            Self::InvalidRadius(r) => write!(f, "window radii must be >= 0, got {r}"),
            Self::RetainRadiusTooSmall { load, drop } => write!(
                f,
                "drop radius ({drop}) must be strictly larger than load radius ({load})"
            ),
            Self::InvalidCategory { name, reason } => {
                write!(f, "prop category `{name}`: {reason}")
            }
            Self::Io(e) => write!(f, "failed to read config: {e}"),
            Self::Parse(e) => write!(f, "failed to parse config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e)
    }
}

/// Transient build failures. All of these are recovered by re-queuing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    LengthMismatch { expected: usize, actual: usize },
    Worker { key: TileKey, reason: String },
    Timeout { key: TileKey },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { expected, actual } => write!(
                f,
                "worker buffer length mismatch: expected {expected}, got {actual}"
            ),
            Self::Worker { key, reason } => {
                write!(f, "worker failed to build tile ({}, {}): {reason}", key.ix, key.iz)
            }
            Self::Timeout { key } => {
                write!(f, "worker did not reply for tile ({}, {}) in time", key.ix, key.iz)
            }
        }
    }
}

impl std::error::Error for BuildError {}
