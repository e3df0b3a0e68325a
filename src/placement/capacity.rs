//! Capacity Query
//!
//! Cheap shortlist of hosts whose aggregate free space could hold a batch,
//! run before the full placement engine.

use crate::ledger::CapacityLedger;
use crate::request::VmRequest;
use tracing::debug;

/// Aggregate local and shared space a batch asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchDemand {
    pub local: u64,
    pub shared: u64,
}

impl BatchDemand {
    pub fn of(vms: &[VmRequest]) -> Self {
        vms.iter().fold(Self::default(), |acc, vm| Self {
            local: acc.local.saturating_add(vm.requested_size(false)),
            shared: acc.shared.saturating_add(vm.requested_size(true)),
        })
    }
}

/// Hosts from `hosts` that are connected and whose local and shared
/// capacities each cover the batch's demand
pub fn feasible_hosts(ledger: &CapacityLedger, vms: &[VmRequest], hosts: &[String]) -> Vec<String> {
    let demand = BatchDemand::of(vms);

    hosts
        .iter()
        .filter(|name| match ledger.host(name) {
            Some(host) => {
                let fits = host.is_connected()
                    && host.local_capacity() >= demand.local
                    && host.shared_capacity() >= demand.shared;
                if !fits {
                    debug!(
                        "Host {} cannot cover {} MB local / {} MB shared",
                        name, demand.local, demand.shared
                    );
                }
                fits
            }
            None => false,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ConnectionState;
    use crate::ledger::{Host, StoragePool};
    use crate::request::VmSpec;

    fn vm(local: u64, shared_data: u64) -> VmRequest {
        VmRequest::from_spec(VmSpec {
            id: "vm-1".into(),
            name: "vm-1".into(),
            system_size: local,
            data_size: shared_data,
            data_shared: Some(true),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_only_hosts_with_enough_local_space() {
        let ledger = CapacityLedger::from_hosts(vec![
            Host::new("a", "c1", ConnectionState::Connected)
                .with_pool(StoragePool::new("ds-a", false, 2000, 2000)),
            Host::new("b", "c1", ConnectionState::Connected)
                .with_pool(StoragePool::new("ds-b", false, 500, 500)),
        ]);

        let hosts = vec!["a".to_string(), "b".to_string()];
        assert_eq!(feasible_hosts(&ledger, &[vm(1000, 0)], &hosts), vec!["a".to_string()]);
    }

    #[test]
    fn test_shared_demand_and_connection_state() {
        let ledger = CapacityLedger::from_hosts(vec![
            Host::new("a", "c1", ConnectionState::Connected)
                .with_pool(StoragePool::new("ds-a", false, 2000, 2000))
                .with_pool(StoragePool::new("san", true, 9000, 9000)),
            Host::new("b", "c1", ConnectionState::NotResponding)
                .with_pool(StoragePool::new("ds-b", false, 2000, 2000))
                .with_pool(StoragePool::new("san", true, 9000, 9000)),
            Host::new("c", "c1", ConnectionState::Connected)
                .with_pool(StoragePool::new("ds-c", false, 2000, 2000)),
        ]);

        let vms = vec![vm(500, 3000), vm(500, 3000)];
        assert_eq!(BatchDemand::of(&vms), BatchDemand { local: 1000, shared: 6000 });

        let hosts: Vec<String> = ["a", "b", "c", "missing"].iter().map(|s| s.to_string()).collect();
        assert_eq!(feasible_hosts(&ledger, &vms, &hosts), vec!["a".to_string()]);
    }
}
