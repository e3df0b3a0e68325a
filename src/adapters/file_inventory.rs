//! File Inventory Source
//!
//! Reads an inventory snapshot exported to disk, as JSON or YAML depending
//! on the file extension.

use crate::domain::ports::{InventorySnapshot, InventorySource};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("yaml") | Some("yml") => Ok(Format::Yaml),
            _ => Err(Error::Inventory(format!(
                "cannot tell the format of {} (expected .json, .yaml or .yml)",
                path.display()
            ))),
        }
    }
}

/// Inventory snapshot stored in a file
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InventorySource for FileInventory {
    async fn fetch(&self, clusters: &[String]) -> Result<InventorySnapshot> {
        let format = Format::of(&self.path)?;
        let raw = tokio::fs::read_to_string(&self.path).await?;

        let mut snapshot: InventorySnapshot = match format {
            Format::Json => serde_json::from_str(&raw)?,
            Format::Yaml => serde_yaml::from_str(&raw)?,
        };
        snapshot.retain_clusters(clusters);

        debug!(
            "Read {} clusters / {} hosts from {}",
            snapshot.clusters.len(),
            snapshot.host_count(),
            self.path.display()
        );
        Ok(snapshot)
    }

    fn source_name(&self) -> &str {
        "file"
    }
}
