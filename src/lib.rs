//! VM Storage Planner - Capacity Ledger and Placement Engine
//!
//! Tracks free and reserved space on the storage pools of a hypervisor
//! cluster and places batches of virtual-machine disks onto hosts and pools.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                            Placement Session                                 │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │  Capacity Query │  │    Placement    │  │      Reservation            │  │
//! │  │ (feasible_hosts)│  │     Engine      │  │      Manager                │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                   │
//! │           └────────────────────┼─────────────────────────┘                   │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │    Capacity Ledger    │                                │
//! │                    │  (live + plan views)  │                                │
//! │                    └───────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                          Collaborator Ports                                  │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │      Inventory Source       │  │        Volume Provisioner           │   │
//! │  │   (snapshot of clusters)    │  │   (create / destroy volumes)        │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`ledger`]: Storage pools, hosts and the capacity ledger
//! - [`request`]: VM and disk requests, volumes
//! - [`placement`]: Candidate ranking, data-disk strategies, placement engine
//! - [`reservation`]: Commission, decommission and volume realization
//! - [`session`]: Planning session over one inventory snapshot
//! - [`adapters`]: Port implementations
//! - [`config`]: Planner configuration
//! - [`domain`]: Collaborator ports
//! - [`error`]: Error types and handling

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod placement;
pub mod request;
pub mod reservation;
pub mod session;

// Re-export commonly used types
pub use adapters::FileInventory;

pub use config::{PlannerConfig, PoolFilter};

pub use domain::ports::{
    ConnectionState, InventorySnapshot, InventorySource, ProvisionResponse, VolumeProvisioner,
    VolumeSpec,
};

pub use error::{Error, ErrorAction, Result};

pub use ledger::{CapacityLedger, Host, LedgerView, StoragePool, DEFAULT_BUFFER_SIZE};

pub use placement::{feasible_hosts, DataOutcome, PlacementEngine, PlacementPlan};

pub use request::{DiskKind, DiskRequest, ProvisionMode, Transport, Volume, VmRequest, VmSpec};

pub use reservation::{create_volumes, delete_volumes, ReservationManager};

pub use session::PlacementSession;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
