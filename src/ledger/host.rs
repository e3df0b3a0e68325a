//! Compute Host
//!
//! A host and the storage pools it reaches, split into pools private to the
//! host (`local`) and pools reachable by several hosts (`shared`). A second
//! pair of maps is a scratch copy used only while a planning pass runs, so
//! speculative reservations for one host never leak into another's view.

use crate::config::PoolFilter;
use crate::domain::ports::{ConnectionState, HostInventory};
use crate::error::{Error, Result};
use crate::ledger::pool::StoragePool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Which pair of pool maps an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerView {
    /// Durable reservations
    Live,
    /// Scratch copy for the running planning pass
    Plan,
}

impl std::fmt::Display for LedgerView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerView::Live => write!(f, "live"),
            LedgerView::Plan => write!(f, "plan"),
        }
    }
}

/// A compute host with its storage pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub cluster: String,
    pub connection_state: ConnectionState,
    pub local: BTreeMap<String, StoragePool>,
    pub shared: BTreeMap<String, StoragePool>,
    #[serde(skip)]
    plan_local: BTreeMap<String, StoragePool>,
    #[serde(skip)]
    plan_share: BTreeMap<String, StoragePool>,
}

impl Host {
    pub fn new(
        name: impl Into<String>,
        cluster: impl Into<String>,
        connection_state: ConnectionState,
    ) -> Self {
        Self {
            name: name.into(),
            cluster: cluster.into(),
            connection_state,
            local: BTreeMap::new(),
            shared: BTreeMap::new(),
            plan_local: BTreeMap::new(),
            plan_share: BTreeMap::new(),
        }
    }

    /// Add a pool to the local or shared map according to its flag
    pub fn with_pool(mut self, pool: StoragePool) -> Self {
        self.add_pool(pool);
        self
    }

    fn add_pool(&mut self, pool: StoragePool) {
        if pool.shared {
            self.shared.insert(pool.name.clone(), pool);
        } else {
            self.local.insert(pool.name.clone(), pool);
        }
    }

    /// Build a host from an inventory record, keeping only pools that pass
    /// the name filter. A pool name may appear only once per host.
    pub fn from_inventory(
        cluster: &str,
        inventory: &HostInventory,
        filter: &PoolFilter,
    ) -> Result<Self> {
        let mut host = Host::new(inventory.name.clone(), cluster, inventory.connection_state);

        for ds in &inventory.datastores {
            if host.local.contains_key(&ds.name) || host.shared.contains_key(&ds.name) {
                return Err(Error::Configuration(format!(
                    "pool {} is reported more than once for host {}",
                    ds.name, inventory.name
                )));
            }
            if !filter.accepts(&ds.name, ds.shared) {
                debug!("Host {}: pool {} filtered out", inventory.name, ds.name);
                continue;
            }
            host.add_pool(StoragePool::from(ds));
        }

        Ok(host)
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// Pools of one scope in the given view
    pub fn pools(&self, view: LedgerView, shared: bool) -> &BTreeMap<String, StoragePool> {
        match (view, shared) {
            (LedgerView::Live, false) => &self.local,
            (LedgerView::Live, true) => &self.shared,
            (LedgerView::Plan, false) => &self.plan_local,
            (LedgerView::Plan, true) => &self.plan_share,
        }
    }

    pub(crate) fn pools_mut(
        &mut self,
        view: LedgerView,
        shared: bool,
    ) -> &mut BTreeMap<String, StoragePool> {
        match (view, shared) {
            (LedgerView::Live, false) => &mut self.local,
            (LedgerView::Live, true) => &mut self.shared,
            (LedgerView::Plan, false) => &mut self.plan_local,
            (LedgerView::Plan, true) => &mut self.plan_share,
        }
    }

    /// Sum of effective free space over local pools
    pub fn local_capacity(&self) -> u64 {
        sum_effective_free(&self.local)
    }

    /// Sum of effective free space over shared pools
    pub fn shared_capacity(&self) -> u64 {
        sum_effective_free(&self.shared)
    }

    /// Local plus shared effective free space in the given view
    pub fn capacity(&self, view: LedgerView) -> u64 {
        sum_effective_free(self.pools(view, false)) + sum_effective_free(self.pools(view, true))
    }

    /// Seed the planning maps from the live maps
    pub(crate) fn begin_planning(&mut self) {
        self.plan_local = self.local.clone();
        self.plan_share = self.shared.clone();
    }
}

fn sum_effective_free(pools: &BTreeMap<String, StoragePool>) -> u64 {
    pools.values().map(StoragePool::effective_free).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::DatastoreInventory;

    fn inventory() -> HostInventory {
        HostInventory {
            name: "esx-1".into(),
            connection_state: ConnectionState::Connected,
            datastores: vec![
                DatastoreInventory {
                    name: "local-a".into(),
                    shared: false,
                    total_space: 1000,
                    free_space: 800,
                },
                DatastoreInventory {
                    name: "local-b".into(),
                    shared: false,
                    total_space: 1000,
                    free_space: 400,
                },
                DatastoreInventory {
                    name: "san-1".into(),
                    shared: true,
                    total_space: 5000,
                    free_space: 3000,
                },
            ],
        }
    }

    #[test]
    fn test_from_inventory_partitions_pools() {
        let host = Host::from_inventory("cluster-a", &inventory(), &PoolFilter::default()).unwrap();
        assert_eq!(host.cluster, "cluster-a");
        assert_eq!(host.local.len(), 2);
        assert_eq!(host.shared.len(), 1);
        assert_eq!(host.local_capacity(), 1200);
        assert_eq!(host.shared_capacity(), 3000);
        assert!(host.is_connected());
    }

    #[test]
    fn test_from_inventory_applies_filter() {
        let filter = PoolFilter::new(None, Some("local-a")).unwrap();
        let host = Host::from_inventory("cluster-a", &inventory(), &filter).unwrap();
        assert_eq!(host.local.keys().collect::<Vec<_>>(), vec!["local-a"]);
        assert_eq!(host.shared.len(), 1);
    }

    #[test]
    fn test_from_inventory_rejects_duplicate_pool() {
        let mut inv = inventory();
        inv.datastores.push(DatastoreInventory {
            name: "local-a".into(),
            shared: true,
            total_space: 10,
            free_space: 10,
        });
        let err = Host::from_inventory("cluster-a", &inv, &PoolFilter::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_planning_maps_are_isolated() {
        let mut host = Host::from_inventory("cluster-a", &inventory(), &PoolFilter::default()).unwrap();
        assert!(host.pools(LedgerView::Plan, false).is_empty());

        host.begin_planning();
        host.pools_mut(LedgerView::Plan, false)
            .get_mut("local-a")
            .unwrap()
            .reserve(500);
        assert_eq!(host.capacity(LedgerView::Plan), 3700);
        assert_eq!(host.capacity(LedgerView::Live), 4200);

        // Reseeding discards earlier speculative reservations
        host.begin_planning();
        assert_eq!(host.capacity(LedgerView::Plan), 4200);
    }
}
