//! Reservation Manager
//!
//! Commits a chosen plan to the live ledger, undoes a commit, and undoes
//! the speculative reservations a planning pass made. All three validate
//! every referenced pool before mutating anything.

use crate::error::{Error, Result};
use crate::ledger::{CapacityLedger, LedgerView};
use crate::request::VmRequest;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Reserve,
    Release,
}

/// Ledger operations over a finalized list of placed VMs
pub struct ReservationManager;

impl ReservationManager {
    /// Durably reserve every volume of `vms`. Returns the capacity the
    /// batch's host lost, in MB.
    pub fn commission(ledger: &mut CapacityLedger, vms: &[VmRequest]) -> Result<u64> {
        let delta = Self::apply(ledger, vms, LedgerView::Live, Direction::Reserve)?;
        if !vms.is_empty() {
            info!("Commissioned {} VMs, {} MB consumed", vms.len(), delta);
        }
        Ok(delta)
    }

    /// Exact inverse of [`ReservationManager::commission`]. Returns the
    /// capacity the batch's host regained, in MB.
    pub fn decommission(ledger: &mut CapacityLedger, vms: &[VmRequest]) -> Result<u64> {
        let delta = Self::apply(ledger, vms, LedgerView::Live, Direction::Release)?;
        if !vms.is_empty() {
            info!("Decommissioned {} VMs, {} MB released", vms.len(), delta);
        }
        Ok(delta)
    }

    /// Same effect as decommission, against the planning view: undoes
    /// speculative placements that never reach commission.
    pub fn recovery(ledger: &mut CapacityLedger, vms: &[VmRequest]) -> Result<u64> {
        let delta = Self::apply(ledger, vms, LedgerView::Plan, Direction::Release)?;
        if !vms.is_empty() {
            debug!("Recovered {} MB from {} planned VMs", delta, vms.len());
        }
        Ok(delta)
    }

    fn apply(
        ledger: &mut CapacityLedger,
        vms: &[VmRequest],
        view: LedgerView,
        direction: Direction,
    ) -> Result<u64> {
        let Some(first) = vms.first() else {
            return Ok(0);
        };
        let batch_host = Self::host_of(first)?.to_string();

        // Validate before mutating so a bad batch leaves the ledger untouched
        for vm in vms {
            let host = Self::host_of(vm)?;
            for volume in vm.volumes() {
                ledger.pool(host, view, volume.shared, &volume.pool_name)?;
            }
        }

        let before = ledger.capacity(&batch_host, view)?;

        for vm in vms {
            let host = Self::host_of(vm)?;
            for (volume, charge) in vm.charges() {
                match direction {
                    Direction::Reserve => {
                        ledger.reserve(host, view, volume.shared, &volume.pool_name, charge)?
                    }
                    Direction::Release => {
                        ledger.release(host, view, volume.shared, &volume.pool_name, charge)?
                    }
                }
            }
        }

        let after = ledger.capacity(&batch_host, view)?;
        Ok(match direction {
            Direction::Reserve => before.saturating_sub(after),
            Direction::Release => after.saturating_sub(before),
        })
    }

    fn host_of(vm: &VmRequest) -> Result<&str> {
        vm.host_name.as_deref().ok_or_else(|| {
            Error::Configuration(format!("VM {} has not been placed on a host", vm.id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ConnectionState;
    use crate::ledger::{Host, StoragePool};
    use crate::request::{DiskKind, VmSpec};
    use assert_matches::assert_matches;

    fn ledger() -> CapacityLedger {
        CapacityLedger::from_hosts(vec![
            Host::new("esx-1", "c1", ConnectionState::Connected)
                .with_pool(StoragePool::new("ds1", false, 5000, 1000))
                .with_pool(StoragePool::new("ds2", false, 5000, 1000))
                .with_pool(StoragePool::new("san", true, 9000, 4000)),
            Host::new("esx-2", "c1", ConnectionState::Connected)
                .with_pool(StoragePool::new("san", true, 9000, 4000)),
        ])
    }

    fn placed_vm() -> VmRequest {
        let mut vm = VmRequest::from_spec(VmSpec {
            id: "vm-1".into(),
            name: "web-01".into(),
            req_mem: 64,
            system_size: 100,
            swap_size: 50,
            data_size: 300,
            ..Default::default()
        })
        .unwrap();
        vm.host_name = Some("esx-1".into());
        vm.add_volume(DiskKind::System, "ds1", false, 100);
        vm.add_volume(DiskKind::Swap, "ds1", false, 50);
        vm.add_volume(DiskKind::Data, "ds2", false, 100);
        vm.add_volume(DiskKind::Data, "san", true, 200);
        vm
    }

    #[test]
    fn test_commission_decommission_round_trip() {
        let mut ledger = ledger();
        let vms = vec![placed_vm()];

        let consumed = ReservationManager::commission(&mut ledger, &vms).unwrap();
        assert_eq!(consumed, 100 + 64 + 50 + 100 + 200);

        let host = ledger.host("esx-1").unwrap();
        assert_eq!(host.local["ds1"].reserved_space(), 214);
        assert_eq!(host.local["ds2"].reserved_space(), 100);
        assert_eq!(host.shared["san"].reserved_space(), 200);
        // The shared pool is the same store on esx-2
        assert_eq!(ledger.host("esx-2").unwrap().shared["san"].reserved_space(), 200);

        let released = ReservationManager::decommission(&mut ledger, &vms).unwrap();
        assert_eq!(released, consumed);
        for host in ledger.hosts() {
            assert!(host.local.values().chain(host.shared.values()).all(|p| p.reserved_space() == 0));
        }
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let mut ledger = ledger();
        assert_eq!(ReservationManager::commission(&mut ledger, &[]).unwrap(), 0);
        assert_eq!(ReservationManager::decommission(&mut ledger, &[]).unwrap(), 0);
        assert_eq!(ReservationManager::recovery(&mut ledger, &[]).unwrap(), 0);
    }

    #[test]
    fn test_unplaced_vm_is_rejected() {
        let mut ledger = ledger();
        let mut vm = placed_vm();
        vm.host_name = None;
        assert_matches!(
            ReservationManager::commission(&mut ledger, &[vm]),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_unknown_pool_leaves_ledger_untouched() {
        let mut ledger = ledger();
        let mut vm = placed_vm();
        vm.add_volume(DiskKind::Data, "ds-gone", false, 10);

        assert_matches!(
            ReservationManager::commission(&mut ledger, &[vm]),
            Err(Error::PoolNotFound { .. })
        );
        assert_eq!(ledger.capacity("esx-1", LedgerView::Live).unwrap(), 6000);
    }

    #[test]
    fn test_recovery_targets_planning_view() {
        let mut ledger = ledger();
        let vms = vec![placed_vm()];
        ledger.host_mut("esx-1").unwrap().begin_planning();
        let before = ledger.capacity("esx-1", LedgerView::Plan).unwrap();

        for (volume, charge) in vms[0].charges() {
            ledger
                .reserve("esx-1", LedgerView::Plan, volume.shared, &volume.pool_name, charge)
                .unwrap();
        }
        let recovered = ReservationManager::recovery(&mut ledger, &vms).unwrap();

        assert_eq!(recovered, 514);
        assert_eq!(ledger.capacity("esx-1", LedgerView::Plan).unwrap(), before);
        assert_eq!(ledger.capacity("esx-1", LedgerView::Live).unwrap(), 6000);
    }
}
