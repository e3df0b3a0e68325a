//! Planner Configuration
//!
//! Settings shared by a planning session: the safety buffer kept free on
//! every pool, the name patterns that decide which datastores enter the
//! ledger, and the clusters to load.

use crate::error::{compile_pattern, Result};
use crate::ledger::pool::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Planner Configuration
// =============================================================================

/// Configuration for a planning session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Headroom (MB) a pool keeps free; pools below it are unusable
    pub buffer_size: u64,
    /// Glob pattern shared datastores must match
    pub share_pool_pattern: Option<String>,
    /// Glob pattern local datastores must match
    pub local_pool_pattern: Option<String>,
    /// Clusters to load on refresh; empty loads every cluster
    pub clusters: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            share_pool_pattern: None,
            local_pool_pattern: None,
            clusters: Vec::new(),
        }
    }
}

impl PlannerConfig {
    /// Load a configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: PlannerConfig = serde_yaml::from_str(&raw)?;
        config.pool_filter()?;
        Ok(config)
    }

    /// Compile the datastore name patterns
    pub fn pool_filter(&self) -> Result<PoolFilter> {
        PoolFilter::new(
            self.share_pool_pattern.as_deref(),
            self.local_pool_pattern.as_deref(),
        )
    }
}

// =============================================================================
// Pool Filter
// =============================================================================

/// Compiled datastore name patterns
#[derive(Debug, Clone, Default)]
pub struct PoolFilter {
    shared: Option<glob::Pattern>,
    local: Option<glob::Pattern>,
}

impl PoolFilter {
    pub fn new(shared: Option<&str>, local: Option<&str>) -> Result<Self> {
        Ok(Self {
            shared: shared.map(compile_pattern).transpose()?,
            local: local.map(compile_pattern).transpose()?,
        })
    }

    /// Whether a datastore of the given scope may enter the ledger
    pub fn accepts(&self, name: &str, shared: bool) -> bool {
        let pattern = if shared { &self.shared } else { &self.local };
        pattern.as_ref().map_or(true, |p| p.matches(name))
    }
}
