//! VM Requests
//!
//! A virtual machine's storage needs for one planning call, built from
//! caller-supplied parameters.

use super::disk::{volume_path, DiskKind, DiskRequest, ProvisionMode, SlotTable, Volume};
use crate::error::{compile_pattern, Error, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// VM Spec
// =============================================================================

/// Caller parameters describing a VM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSpec {
    pub id: String,
    pub name: String,
    /// Memory reservation in MB, stored next to the system disk
    pub req_mem: u64,
    pub system_size: u64,
    pub system_shared: bool,
    pub system_mode: ProvisionMode,
    pub swap_size: u64,
    pub swap_mode: ProvisionMode,
    pub data_size: u64,
    pub data_mode: ProvisionMode,
    /// Defaults to `system_shared`
    pub data_shared: Option<bool>,
    pub data_affinity: bool,
    pub data_bisect: bool,
    /// Glob pattern pool names must match
    pub pool_pattern: Option<String>,
}

// =============================================================================
// VM Request
// =============================================================================

/// A VM to place, and after placement the volumes it was given.
///
/// `Clone` is a full deep copy (the volume maps included), which is what
/// lets one request act as a template for trials on several hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRequest {
    pub id: String,
    pub name: String,
    pub memory_reservation: u64,
    pub pool_pattern: Option<String>,
    pub system: DiskRequest,
    pub swap: DiskRequest,
    pub data: DiskRequest,
    /// Host the volumes were placed on
    pub host_name: Option<String>,
    #[serde(default)]
    slots: SlotTable,
}

impl VmRequest {
    /// Build and validate a request
    pub fn from_spec(spec: VmSpec) -> Result<Self> {
        if spec.id.trim().is_empty() {
            return Err(Error::Configuration("VM id is required".into()));
        }
        if spec.name.trim().is_empty() {
            return Err(Error::Configuration(format!("VM {} has no name", spec.id)));
        }
        if spec.system_size == 0 {
            return Err(Error::Configuration(format!(
                "VM {} requests an empty system disk",
                spec.id
            )));
        }
        if let Some(pattern) = &spec.pool_pattern {
            compile_pattern(pattern)?;
        }

        // Swap always follows the system disk's scope
        let system = DiskRequest::new(DiskKind::System, spec.system_size, spec.system_shared, spec.system_mode);
        let swap = DiskRequest::new(DiskKind::Swap, spec.swap_size, spec.system_shared, spec.swap_mode);
        let data = DiskRequest::new(
            DiskKind::Data,
            spec.data_size,
            spec.data_shared.unwrap_or(spec.system_shared),
            spec.data_mode,
        )
        .with_affinity(spec.data_affinity)
        .with_bisect(spec.data_bisect);

        Ok(Self {
            id: spec.id,
            name: spec.name,
            memory_reservation: spec.req_mem,
            pool_pattern: spec.pool_pattern,
            system,
            swap,
            data,
            host_name: None,
            slots: SlotTable::default(),
        })
    }

    pub fn disk(&self, kind: DiskKind) -> &DiskRequest {
        match kind {
            DiskKind::System => &self.system,
            DiskKind::Swap => &self.swap,
            DiskKind::Data => &self.data,
        }
    }

    fn disk_mut(&mut self, kind: DiskKind) -> &mut DiskRequest {
        match kind {
            DiskKind::System => &mut self.system,
            DiskKind::Swap => &mut self.swap,
            DiskKind::Data => &mut self.data,
        }
    }

    /// Compiled pool name filter
    pub fn pool_filter(&self) -> Option<glob::Pattern> {
        self.pool_pattern.as_deref().and_then(|p| glob::Pattern::new(p).ok())
    }

    /// Space the system and swap disks need on a single pool, memory included
    pub fn system_footprint(&self) -> u64 {
        self.memory_reservation
            .saturating_add(self.system.size)
            .saturating_add(self.swap.size)
    }

    /// Requested disk size in the given scope, memory excluded
    pub fn requested_size(&self, shared: bool) -> u64 {
        [&self.system, &self.swap, &self.data]
            .iter()
            .filter(|d| d.shared == shared)
            .fold(0u64, |acc, d| acc.saturating_add(d.size))
    }

    /// All placed volumes: system, then swap, then data
    pub fn volumes(&self) -> impl Iterator<Item = &Volume> {
        self.system
            .volumes
            .values()
            .chain(self.swap.volumes.values())
            .chain(self.data.volumes.values())
    }

    /// Ledger charge of every placed volume
    pub fn charges(&self) -> impl Iterator<Item = (&Volume, u64)> {
        let mem = self.memory_reservation;
        self.volumes().map(move |v| (v, v.ledger_charge(mem)))
    }

    /// Record a volume of `size` MB for `kind` on `pool`
    pub(crate) fn add_volume(&mut self, kind: DiskKind, pool: &str, shared: bool, size: u64) -> Volume {
        let transport = self.disk(kind).transport();
        let slot = self.slots.allocate(transport);
        let volume = Volume {
            kind,
            vm_id: self.id.clone(),
            mode: self.disk(kind).mode,
            full_path: volume_path(pool, &self.name, shared, transport, slot),
            size,
            pool_name: pool.to_string(),
            shared,
            transport,
            slot,
        };
        self.disk_mut(kind)
            .volumes
            .insert(volume.full_path.clone(), volume.clone());
        volume
    }
}

impl TryFrom<VmSpec> for VmRequest {
    type Error = Error;

    fn try_from(spec: VmSpec) -> Result<Self> {
        VmRequest::from_spec(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::disk::{Transport, RESERVED_SLOT};
    use assert_matches::assert_matches;

    fn spec() -> VmSpec {
        VmSpec {
            id: "vm-1".into(),
            name: "web-01".into(),
            req_mem: 64,
            system_size: 100,
            swap_size: 50,
            data_size: 200,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_spec() {
        let vm = VmRequest::from_spec(spec()).unwrap();
        assert_eq!(vm.system.kind, DiskKind::System);
        assert_eq!(vm.swap.mode, ProvisionMode::Thin);
        assert!(!vm.data.affinity);
        assert!(!vm.data.shared);
        assert_eq!(vm.system_footprint(), 214);
        assert_eq!(vm.requested_size(false), 350);
        assert_eq!(vm.requested_size(true), 0);
    }

    #[test]
    fn test_data_scope_follows_system_by_default() {
        let vm = VmRequest::from_spec(VmSpec { system_shared: true, ..spec() }).unwrap();
        assert!(vm.swap.shared);
        assert!(vm.data.shared);

        let vm = VmRequest::from_spec(VmSpec {
            system_shared: true,
            data_shared: Some(false),
            ..spec()
        })
        .unwrap();
        assert_eq!(vm.requested_size(true), 150);
        assert_eq!(vm.requested_size(false), 200);
    }

    #[test]
    fn test_from_spec_validation() {
        assert_matches!(
            VmRequest::from_spec(VmSpec { id: "".into(), ..spec() }),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            VmRequest::from_spec(VmSpec { system_size: 0, ..spec() }),
            Err(Error::Configuration(_))
        );
        assert_matches!(
            VmRequest::try_from(VmSpec { pool_pattern: Some("[".into()), ..spec() }),
            Err(Error::InvalidPattern { .. })
        );
    }

    #[test]
    fn test_add_volume_assigns_slots_per_transport() {
        let mut vm = VmRequest::from_spec(spec()).unwrap();
        let sys = vm.add_volume(DiskKind::System, "ds1", false, 100);
        let swap = vm.add_volume(DiskKind::Swap, "ds1", false, 50);
        assert_eq!((sys.transport, sys.slot), (Transport::Standard, 0));
        assert_eq!((swap.transport, swap.slot), (Transport::Standard, 1));

        let slots: Vec<u32> = (0..8)
            .map(|_| vm.add_volume(DiskKind::Data, "ds2", false, 10).slot)
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 4, 5, 6, 8]);
        assert!(!slots.contains(&RESERVED_SLOT));
        assert_eq!(vm.data.volumes.len(), 8);
        assert_eq!(vm.data.placed_size(), 80);
    }

    #[test]
    fn test_sizes_saturate() {
        let vm = VmRequest::from_spec(VmSpec {
            req_mem: u64::MAX,
            system_size: u64::MAX,
            swap_size: 10,
            data_size: u64::MAX,
            ..spec()
        })
        .unwrap();
        assert_eq!(vm.system_footprint(), u64::MAX);
        assert_eq!(vm.requested_size(false), u64::MAX);
    }

    #[test]
    fn test_clone_is_independent() {
        let template = VmRequest::from_spec(spec()).unwrap();
        let mut attempt = template.clone();
        attempt.add_volume(DiskKind::System, "ds1", false, 100);
        attempt.host_name = Some("esx-1".into());

        assert!(template.system.volumes.is_empty());
        assert!(template.host_name.is_none());
        assert_eq!(attempt.volumes().count(), 1);
    }

    #[test]
    fn test_charges_include_memory_on_system_volume() {
        let mut vm = VmRequest::from_spec(spec()).unwrap();
        vm.add_volume(DiskKind::System, "ds1", false, 100);
        vm.add_volume(DiskKind::Swap, "ds1", false, 50);
        let total: u64 = vm.charges().map(|(_, c)| c).sum();
        assert_eq!(total, 214);
    }
}
