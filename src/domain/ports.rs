//! Domain Ports - Collaborator contracts for the planner
//!
//! The capacity ledger and placement engine only talk to the outside world
//! through these traits. Adapters implement them against a real management
//! API, a snapshot file, or an in-memory fake.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Inventory Snapshot
// =============================================================================

/// Connection state of a compute host as reported by the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    NotResponding,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::NotResponding => write!(f, "not_responding"),
        }
    }
}

/// A datastore as seen from one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreInventory {
    /// Datastore name
    pub name: String,
    /// Reachable by more than one host
    #[serde(default)]
    pub shared: bool,
    /// Total capacity in MB
    pub total_space: u64,
    /// Free capacity in MB
    pub free_space: u64,
}

/// A compute host and the datastores it can reach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInventory {
    pub name: String,
    pub connection_state: ConnectionState,
    #[serde(default)]
    pub datastores: Vec<DatastoreInventory>,
}

/// All hosts of one cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInventory {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<HostInventory>,
}

/// Point-in-time view of the managed clusters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub clusters: Vec<ClusterInventory>,
    /// When the snapshot was taken
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

impl InventorySnapshot {
    /// Keep only the named clusters. An empty list keeps everything.
    pub fn retain_clusters(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.clusters.retain(|c| names.contains(&c.name));
    }

    /// Number of hosts across all clusters
    pub fn host_count(&self) -> usize {
        self.clusters.iter().map(|c| c.hosts.len()).sum()
    }
}

// =============================================================================
// Inventory Source Port
// =============================================================================

/// Port for fetching the host/datastore inventory
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Fetch hosts and datastores for the named clusters
    async fn fetch(&self, clusters: &[String]) -> Result<InventorySnapshot>;

    /// Get source name
    fn source_name(&self) -> &str;
}

// =============================================================================
// Volume Provisioning Port
// =============================================================================

/// Outcome of a remote provisioning task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Success,
    Error,
}

/// Parameters for creating or destroying one volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Owning virtual machine
    pub vm_id: String,
    /// Provisioning mode (thin, thick_eager_zeroed, thick_lazy_zeroed)
    pub mode: String,
    /// Pool-qualified path, e.g. `[ds1] web-01/local-scsi1-0.vmdk`
    pub full_path: String,
    /// Size in MB
    pub size: u64,
    /// Pool holding the volume
    pub pool_name: String,
}

/// Response from the volume provisioning collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub state: TaskState,
    #[serde(default)]
    pub message: Option<String>,
}

impl ProvisionResponse {
    pub fn success() -> Self {
        Self {
            state: TaskState::Success,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Success
    }
}

/// Port for volume create/destroy operations
#[async_trait]
pub trait VolumeProvisioner: Send + Sync {
    /// Create a volume and attach it to its VM
    async fn create(&self, spec: &VolumeSpec) -> Result<ProvisionResponse>;

    /// Detach and destroy a volume
    async fn destroy(&self, spec: &VolumeSpec) -> Result<ProvisionResponse>;
}
