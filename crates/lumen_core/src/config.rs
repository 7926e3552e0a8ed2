//! Render configuration.
//!
//! A flat record consumed by the render manager and the worker pool.
//! Every field has a documented default so partial JSON files load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default tile width in pixels.
pub const DEFAULT_TILE_WIDTH: u32 = 8;

/// Default target samples per pixel.
pub const DEFAULT_TARGET_SPP: u64 = 1000;

/// Errors raised while building or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("tile width must be at least 1 pixel")]
    ZeroTileWidth,

    #[error("samples per pass must be at least 1")]
    ZeroSamplesPerPass,

    #[error("target spp must be at least 1")]
    ZeroTargetSpp,

    #[error("cpu load must be within 1..=100, got {0}")]
    InvalidCpuLoad(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Passes run back to back before progress is reported
    pub samples_per_pass: u32,
    /// Number of render worker threads
    pub threads: usize,
    /// Edge length of a square tile in pixels
    pub tile_width: u32,
    /// Samples per pixel at which rendering stops
    pub target_spp: u64,
    /// Target CPU utilization in percent (1..=100)
    pub cpu_load: u32,
    /// Base seed for per-tile sample seeds
    pub seed: u64,
    /// Exit the scheduling thread once the target is reached
    pub headless: bool,
    /// Save an image every this many spp (0 disables)
    pub snapshot_interval: u64,
    /// Save a render dump every this many spp (0 disables)
    pub dump_interval: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            samples_per_pass: 1,
            threads: default_thread_count(),
            tile_width: DEFAULT_TILE_WIDTH,
            target_spp: DEFAULT_TARGET_SPP,
            cpu_load: 100,
            seed: 0,
            headless: false,
            snapshot_interval: 0,
            dump_interval: 0,
        }
    }
}

/// Available hardware parallelism, or 1 if it cannot be queried.
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl RenderConfig {
    /// Parse a configuration from JSON text. Missing fields take their defaults.
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject configurations the renderer cannot run with.
    ///
    /// Values are never clamped: a zero thread count is an error, not 1.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.tile_width == 0 {
            return Err(ConfigError::ZeroTileWidth);
        }
        if self.samples_per_pass == 0 {
            return Err(ConfigError::ZeroSamplesPerPass);
        }
        if self.target_spp == 0 {
            return Err(ConfigError::ZeroTargetSpp);
        }
        if !(1..=100).contains(&self.cpu_load) {
            return Err(ConfigError::InvalidCpuLoad(self.cpu_load));
        }
        Ok(())
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_tile_width(mut self, tile_width: u32) -> Self {
        self.tile_width = tile_width;
        self
    }

    pub fn with_target_spp(mut self, target_spp: u64) -> Self {
        self.target_spp = target_spp;
        self
    }

    pub fn with_samples_per_pass(mut self, samples_per_pass: u32) -> Self {
        self.samples_per_pass = samples_per_pass;
        self
    }

    pub fn with_cpu_load(mut self, cpu_load: u32) -> Self {
        self.cpu_load = cpu_load;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_snapshot_interval(mut self, snapshot_interval: u64) -> Self {
        self.snapshot_interval = snapshot_interval;
        self
    }

    pub fn with_dump_interval(mut self, dump_interval: u64) -> Self {
        self.dump_interval = dump_interval;
        self
    }
}
