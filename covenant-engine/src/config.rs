//! Engine configuration.

use covenant_isolation::{ContextOptions, DEFAULT_CACHE_CAPACITY};
use std::path::PathBuf;

/// Environment variable holding the worker pool size.
pub const WORKER_POOL_SIZE_ENV: &str = "COVENANT_WORKER_POOL_SIZE";

pub const DEFAULT_WORKER_POOL_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent fetch/store tasks.
    pub worker_pool_size: usize,
    /// Isolation contexts kept in the module cache.
    pub module_cache_capacity: usize,
    /// Register archives nested inside archives.
    pub read_nested_archives: bool,
    /// Directory for materialized archives; system temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            module_cache_capacity: DEFAULT_CACHE_CAPACITY,
            read_nested_archives: true,
            scratch_dir: None,
        }
    }
}

impl EngineConfig {
    /// Defaults, with the pool size taken from `COVENANT_WORKER_POOL_SIZE`.
    pub fn from_env() -> Self {
        Self {
            worker_pool_size: parse_pool_size(std::env::var(WORKER_POOL_SIZE_ENV).ok().as_deref()),
            ..Self::default()
        }
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    pub fn with_module_cache_capacity(mut self, capacity: usize) -> Self {
        self.module_cache_capacity = capacity.max(1);
        self
    }

    pub fn with_nested_archives(mut self, enabled: bool) -> Self {
        self.read_nested_archives = enabled;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            read_nested_archives: self.read_nested_archives,
            scratch_dir: self.scratch_dir.clone(),
        }
    }
}

/// Pool size from a raw env value. Missing, empty, non-numeric and zero
/// values fall back to the default.
pub fn parse_pool_size(raw: Option<&str>) -> usize {
    match raw.map(str::trim).and_then(|v| v.parse::<usize>().ok()) {
        Some(size) if size > 0 => size,
        _ => DEFAULT_WORKER_POOL_SIZE,
    }
}
