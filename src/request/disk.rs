//! Disk Requests and Volumes
//!
//! What a virtual machine asks for on one disk class, and the volumes the
//! placement engine resolves it into.

use crate::domain::ports::VolumeSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Controller slot reserved for the controller itself
pub const RESERVED_SLOT: u32 = 7;

// =============================================================================
// Disk Kind
// =============================================================================

/// Disk class within a VM request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskKind {
    System,
    Swap,
    Data,
}

impl std::fmt::Display for DiskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskKind::System => write!(f, "system"),
            DiskKind::Swap => write!(f, "swap"),
            DiskKind::Data => write!(f, "data"),
        }
    }
}

// =============================================================================
// Provisioning Mode
// =============================================================================

/// How the backing file is allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionMode {
    #[default]
    Thin,
    ThickEagerZeroed,
    ThickLazyZeroed,
}

impl std::fmt::Display for ProvisionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionMode::Thin => write!(f, "thin"),
            ProvisionMode::ThickEagerZeroed => write!(f, "thick_eager_zeroed"),
            ProvisionMode::ThickLazyZeroed => write!(f, "thick_lazy_zeroed"),
        }
    }
}

// =============================================================================
// Device Addressing
// =============================================================================

/// Controller a volume is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// System, swap and affinity data disks
    Standard,
    /// Data disks spread across pools
    Striped,
}

impl Transport {
    /// Short code used in volume file names
    pub fn code(&self) -> &'static str {
        match self {
            Transport::Standard => "scsi0",
            Transport::Striped => "scsi1",
        }
    }
}

/// Next free slot per controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTable {
    next: BTreeMap<Transport, u32>,
}

impl SlotTable {
    /// Hand out the next slot on `transport`, never the reserved one
    pub fn allocate(&mut self, transport: Transport) -> u32 {
        let slot = self.next.entry(transport).or_insert(0);
        if *slot == RESERVED_SLOT {
            *slot += 1;
        }
        let allocated = *slot;
        *slot += 1;
        allocated
    }

    /// Slot the next allocation on `transport` would return
    pub fn peek(&self, transport: Transport) -> u32 {
        match self.next.get(&transport).copied().unwrap_or(0) {
            RESERVED_SLOT => RESERVED_SLOT + 1,
            slot => slot,
        }
    }
}

// =============================================================================
// Volume
// =============================================================================

/// One placed volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub kind: DiskKind,
    pub vm_id: String,
    pub mode: ProvisionMode,
    /// Pool-qualified path, unique within the owning disk request
    pub full_path: String,
    /// Size in MB
    pub size: u64,
    pub pool_name: String,
    /// Whether `pool_name` is a shared pool
    pub shared: bool,
    pub transport: Transport,
    pub slot: u32,
}

impl Volume {
    /// Space this volume holds on its pool. The system volume also carries
    /// the VM's memory reservation, which lives next to it.
    pub fn ledger_charge(&self, memory_reservation: u64) -> u64 {
        match self.kind {
            DiskKind::System => self.size.saturating_add(memory_reservation),
            DiskKind::Swap | DiskKind::Data => self.size,
        }
    }

    pub fn to_spec(&self) -> VolumeSpec {
        VolumeSpec {
            vm_id: self.vm_id.clone(),
            mode: self.mode.to_string(),
            full_path: self.full_path.clone(),
            size: self.size,
            pool_name: self.pool_name.clone(),
        }
    }
}

/// Build the pool-qualified path of a volume
pub fn volume_path(pool: &str, vm_name: &str, shared: bool, transport: Transport, slot: u32) -> String {
    let scope = if shared { "shared" } else { "local" };
    format!("[{}] {}/{}-{}-{}.vmdk", pool, vm_name, scope, transport.code(), slot)
}

/// Recover the pool name from a `[pool] dir/file` path
pub fn pool_name_from_path(path: &str) -> Option<&str> {
    let rest = path.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    Some(&rest[..end])
}

// =============================================================================
// Disk Request
// =============================================================================

/// How a data disk is spread over pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLayout {
    /// Two equal halves, ideally on two pools
    Bisect,
    /// As few pools as possible
    Affinity,
    /// Evenly across as many pools as needed
    AntiAffinity,
}

/// Requirement for one disk class of a VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskRequest {
    pub kind: DiskKind,
    pub shared: bool,
    pub mode: ProvisionMode,
    /// Total size in MB
    pub size: u64,
    pub affinity: bool,
    pub bisect: bool,
    /// Placed volumes keyed by full path, in placement order
    pub volumes: IndexMap<String, Volume>,
}

impl DiskRequest {
    pub fn new(kind: DiskKind, size: u64, shared: bool, mode: ProvisionMode) -> Self {
        Self {
            kind,
            shared,
            mode,
            size,
            // System and swap always live on a single pool
            affinity: !matches!(kind, DiskKind::Data),
            bisect: false,
            volumes: IndexMap::new(),
        }
    }

    pub fn with_affinity(mut self, affinity: bool) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn with_bisect(mut self, bisect: bool) -> Self {
        self.bisect = bisect;
        self
    }

    /// Placement strategy, by priority bisect > affinity > anti-affinity.
    /// A disk under 2 MB cannot be halved and is not bisected.
    pub fn layout(&self) -> DataLayout {
        if self.bisect && self.size >= 2 {
            DataLayout::Bisect
        } else if self.affinity {
            DataLayout::Affinity
        } else {
            DataLayout::AntiAffinity
        }
    }

    /// Controller the volumes of this disk attach to
    pub fn transport(&self) -> Transport {
        match self.kind {
            DiskKind::System | DiskKind::Swap => Transport::Standard,
            DiskKind::Data if self.affinity => Transport::Standard,
            DiskKind::Data => Transport::Striped,
        }
    }

    /// Sum of placed volume sizes
    pub fn placed_size(&self) -> u64 {
        self.volumes.values().fold(0u64, |acc, v| acc.saturating_add(v.size))
    }

    /// Whether the placed volumes cover the requested size
    pub fn is_placed(&self) -> bool {
        self.placed_size() >= self.size
    }
}
