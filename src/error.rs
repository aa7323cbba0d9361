//! Error types for planning a mix.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised before or during a solver call.
///
/// Every variant describes which input violated a precondition; solvers never
/// degrade silently.
#[derive(Debug, Error)]
pub enum MixError {
    /// A track was rejected before any solver ran.
    #[error("invalid track #{index}: {reason}")]
    InvalidTrack {
        /// Position of the track in the caller's list.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Key text that is neither Camelot nor standard notation.
    #[error("invalid key '{0}'")]
    InvalidKey(String),

    /// A shift outside -1, 0, +1.
    #[error("invalid shift {0}: must be -1, 0 or +1")]
    InvalidShift(i8),

    /// A configuration value is out of range.
    #[error("invalid configuration '{field}': {reason}")]
    Configuration {
        /// Dotted name of the offending option, e.g. `annealing.final_temperature`.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The exact solver was requested for more tracks than it supports.
    #[error("exact solver supports at most {max} tracks, got {tracks}")]
    ExactSolverUnavailable {
        /// Number of tracks in the request.
        tracks: usize,
        /// Configured bound.
        max: usize,
    },

    /// Failed to read a configuration file.
    #[error("failed to read config '{path}': {source}")]
    ConfigRead {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The requested worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// The exact DP table did not reproduce a predecessor during path recovery.
    #[error("exact solver could not reconstruct the path at subset {mask:#b}")]
    Reconstruction {
        /// Subset being walked back from.
        mask: usize,
    },
}

impl MixError {
    /// Create an invalid track error.
    pub fn invalid_track(index: usize, reason: impl Into<String>) -> Self {
        MixError::InvalidTrack {
            index,
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        MixError::Configuration {
            field,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MixError>;
