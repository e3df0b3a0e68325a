//! Capacity Ledger
//!
//! Owns the host/pool graph of a session and is the only place pool
//! reservations change. Everything else reads capacity through it.

pub mod host;
pub mod pool;

pub use host::*;
pub use pool::*;

use crate::config::PoolFilter;
use crate::domain::ports::InventorySnapshot;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// The host/pool graph and its reservations
#[derive(Debug, Clone, Default)]
pub struct CapacityLedger {
    hosts: BTreeMap<String, Host>,
}

impl CapacityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hosts(hosts: impl IntoIterator<Item = Host>) -> Self {
        Self {
            hosts: hosts.into_iter().map(|h| (h.name.clone(), h)).collect(),
        }
    }

    /// Build the ledger from an inventory snapshot
    pub fn from_snapshot(snapshot: &InventorySnapshot, filter: &PoolFilter) -> Result<Self> {
        let mut hosts = BTreeMap::new();
        for cluster in &snapshot.clusters {
            for inventory in &cluster.hosts {
                let host = Host::from_inventory(&cluster.name, inventory, filter)?;
                if hosts.insert(host.name.clone(), host).is_some() {
                    return Err(Error::Configuration(format!(
                        "host {} appears in more than one cluster",
                        inventory.name
                    )));
                }
            }
        }

        info!(
            "Ledger loaded {} hosts from {} clusters",
            hosts.len(),
            snapshot.clusters.len()
        );
        Ok(Self { hosts })
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hosts.contains_key(name)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub(crate) fn host_mut(&mut self, name: &str) -> Result<&mut Host> {
        self.hosts.get_mut(name).ok_or_else(|| Error::HostNotFound {
            host: name.to_string(),
        })
    }

    /// Look up one pool
    pub fn pool(
        &self,
        host: &str,
        view: LedgerView,
        shared: bool,
        pool: &str,
    ) -> Result<&StoragePool> {
        let h = self.hosts.get(host).ok_or_else(|| Error::HostNotFound {
            host: host.to_string(),
        })?;
        h.pools(view, shared).get(pool).ok_or_else(|| Error::PoolNotFound {
            host: host.to_string(),
            pool: pool.to_string(),
        })
    }

    /// Local plus shared effective free space of a host
    pub fn capacity(&self, host: &str, view: LedgerView) -> Result<u64> {
        self.hosts
            .get(host)
            .map(|h| h.capacity(view))
            .ok_or_else(|| Error::HostNotFound {
                host: host.to_string(),
            })
    }

    /// Add `amount` MB to a pool's reservation
    pub fn reserve(
        &mut self,
        host: &str,
        view: LedgerView,
        shared: bool,
        pool: &str,
        amount: u64,
    ) -> Result<()> {
        self.adjust(host, view, shared, pool, |p| p.reserve(amount))
    }

    /// Remove `amount` MB from a pool's reservation
    pub fn release(
        &mut self,
        host: &str,
        view: LedgerView,
        shared: bool,
        pool: &str,
        amount: u64,
    ) -> Result<()> {
        self.adjust(host, view, shared, pool, |p| p.release(amount))
    }

    /// Apply `f` to the pool. A live shared pool is one physical store, so
    /// every host that reaches it sees the change; planning views stay
    /// private to their host.
    fn adjust(
        &mut self,
        host: &str,
        view: LedgerView,
        shared: bool,
        pool: &str,
        f: impl Fn(&mut StoragePool),
    ) -> Result<()> {
        // Fail before touching anything
        self.pool(host, view, shared, pool)?;

        if shared && view == LedgerView::Live {
            let mut touched = 0usize;
            for h in self.hosts.values_mut() {
                if let Some(p) = h.pools_mut(view, true).get_mut(pool) {
                    f(p);
                    touched += 1;
                }
            }
            debug!("Shared pool {} adjusted on {} hosts", pool, touched);
        } else {
            let p = self
                .host_mut(host)?
                .pools_mut(view, shared)
                .get_mut(pool)
                .ok_or_else(|| Error::Internal(format!("pool {} vanished", pool)))?;
            f(p);
        }
        Ok(())
    }
}
