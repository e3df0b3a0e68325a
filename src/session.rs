//! Placement Session
//!
//! Owns the ledger built from one inventory snapshot together with the
//! planner configuration, and exposes the planning and reservation calls
//! against it. A session replaces any notion of process-wide inventory:
//! callers hold it and pass it where it is needed.

use crate::config::PlannerConfig;
use crate::domain::ports::{InventorySnapshot, InventorySource, VolumeProvisioner};
use crate::error::Result;
use crate::ledger::CapacityLedger;
use crate::placement::{feasible_hosts, PlacementEngine, PlacementPlan};
use crate::request::{Volume, VmRequest};
use crate::reservation::{self, ReservationManager};
use tracing::info;

/// A planning and commission session over one host/pool graph
#[derive(Debug, Clone)]
pub struct PlacementSession {
    config: PlannerConfig,
    ledger: CapacityLedger,
}

impl PlacementSession {
    /// Create a session with an empty ledger
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            ledger: CapacityLedger::new(),
        }
    }

    /// Create a session from an already fetched snapshot
    pub fn from_snapshot(snapshot: &InventorySnapshot, config: PlannerConfig) -> Result<Self> {
        let ledger = CapacityLedger::from_snapshot(snapshot, &config.pool_filter()?)?;
        Ok(Self { config, ledger })
    }

    /// Re-fetch the inventory and rebuild the ledger. Reservations made
    /// against the previous ledger are dropped with it.
    pub async fn refresh(&mut self, source: &dyn InventorySource) -> Result<()> {
        let mut snapshot = source.fetch(&self.config.clusters).await?;
        snapshot.retain_clusters(&self.config.clusters);

        self.ledger = CapacityLedger::from_snapshot(&snapshot, &self.config.pool_filter()?)?;
        info!(
            "Refreshed inventory from {}: {} hosts (snapshot taken {})",
            source.source_name(),
            self.ledger.len(),
            snapshot.fetched_at
        );
        Ok(())
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    // =========================================================================
    // Planning API
    // =========================================================================

    /// Shortlist the hosts whose aggregate capacity could hold `vms`
    pub fn feasible_hosts(&self, vms: &[VmRequest], hosts: &[String]) -> Vec<String> {
        feasible_hosts(&self.ledger, vms, hosts)
    }

    /// Plan `vms` on every host in `hosts`. Live reservations are untouched.
    pub fn plan(&mut self, vms: &[VmRequest], hosts: &[String]) -> Result<PlacementPlan> {
        PlacementEngine::new(self.config.buffer_size).plan(&mut self.ledger, vms, hosts)
    }

    // =========================================================================
    // Reservation API
    // =========================================================================

    pub fn commission(&mut self, vms: &[VmRequest]) -> Result<u64> {
        ReservationManager::commission(&mut self.ledger, vms)
    }

    pub fn decommission(&mut self, vms: &[VmRequest]) -> Result<u64> {
        ReservationManager::decommission(&mut self.ledger, vms)
    }

    pub async fn create_volumes(
        &self,
        provisioner: &dyn VolumeProvisioner,
        vm: &VmRequest,
    ) -> Result<Vec<Volume>> {
        reservation::create_volumes(provisioner, vm).await
    }

    pub async fn delete_volumes(&self, provisioner: &dyn VolumeProvisioner, vm: &VmRequest) -> Result<()> {
        reservation::delete_volumes(provisioner, vm).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ClusterInventory, ConnectionState, DatastoreInventory, HostInventory};
    use crate::error::Error;
    use crate::ledger::LedgerView;
    use crate::request::VmSpec;
    use crate::reservation::realization::tests::FakeProvisioner;
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    fn datastore(name: &str, shared: bool, free: u64) -> DatastoreInventory {
        DatastoreInventory {
            name: name.into(),
            shared,
            total_space: free * 2,
            free_space: free,
        }
    }

    fn snapshot() -> InventorySnapshot {
        InventorySnapshot {
            clusters: vec![
                ClusterInventory {
                    name: "c1".into(),
                    hosts: vec![
                        HostInventory {
                            name: "esx-1".into(),
                            connection_state: ConnectionState::Connected,
                            datastores: vec![
                                datastore("ds1", false, 5000),
                                datastore("san-1", true, 20000),
                                datastore("nfs-old", true, 90000),
                            ],
                        },
                        HostInventory {
                            name: "esx-2".into(),
                            connection_state: ConnectionState::Connected,
                            datastores: vec![datastore("ds2", false, 2000), datastore("san-1", true, 20000)],
                        },
                    ],
                },
                ClusterInventory {
                    name: "c2".into(),
                    hosts: vec![HostInventory {
                        name: "esx-9".into(),
                        connection_state: ConnectionState::Connected,
                        datastores: vec![datastore("ds9", false, 50000)],
                    }],
                },
            ],
            fetched_at: chrono::Utc::now(),
        }
    }

    fn config() -> PlannerConfig {
        PlannerConfig {
            share_pool_pattern: Some("san-*".into()),
            ..Default::default()
        }
    }

    fn vm() -> VmRequest {
        VmRequest::from_spec(VmSpec {
            id: "vm-1".into(),
            name: "app-01".into(),
            system_size: 100,
            swap_size: 50,
            data_size: 1000,
            ..Default::default()
        })
        .unwrap()
    }

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    struct StaticInventory(InventorySnapshot);

    #[async_trait]
    impl InventorySource for StaticInventory {
        async fn fetch(&self, _clusters: &[String]) -> Result<InventorySnapshot> {
            Ok(self.0.clone())
        }

        fn source_name(&self) -> &str {
            "static"
        }
    }

    #[test]
    fn test_from_snapshot_applies_pool_patterns() {
        let session = PlacementSession::from_snapshot(&snapshot(), config()).unwrap();
        let host = session.ledger().host("esx-1").unwrap();

        assert_eq!(session.ledger().len(), 3);
        assert!(host.shared.contains_key("san-1"));
        assert!(!host.shared.contains_key("nfs-old"));
    }

    #[test]
    fn test_refresh_limits_to_configured_clusters() {
        let mut session = PlacementSession::new(PlannerConfig {
            clusters: vec!["c1".into()],
            ..config()
        });
        assert!(session.ledger().is_empty());

        tokio_test::block_on(session.refresh(&StaticInventory(snapshot()))).unwrap();

        assert_eq!(session.ledger().len(), 2);
        assert!(!session.ledger().contains("esx-9"));
    }

    #[test]
    fn test_plan_then_commission() {
        let mut session = PlacementSession::from_snapshot(&snapshot(), config()).unwrap();
        let vms = vec![vm()];
        let candidates = hosts(&["esx-2", "esx-1"]);

        assert_eq!(session.feasible_hosts(&vms, &candidates), candidates);

        let mut plan = session.plan(&vms, &candidates).unwrap();
        assert_eq!(plan.hosts(), vec!["esx-1", "esx-2"]);
        // Planning never touches live reservations
        assert_eq!(session.ledger().capacity("esx-1", LedgerView::Live).unwrap(), 25000);

        let chosen = plan.take("esx-1").unwrap();
        assert_eq!(chosen[0].host_name.as_deref(), Some("esx-1"));

        let consumed = session.commission(&chosen).unwrap();
        assert_eq!(consumed, 1150);
        assert_eq!(session.ledger().capacity("esx-1", LedgerView::Live).unwrap(), 23850);

        let released = session.decommission(&chosen).unwrap();
        assert_eq!(released, consumed);
        assert_eq!(session.ledger().capacity("esx-1", LedgerView::Live).unwrap(), 25000);
    }

    #[test]
    fn test_single_pool_commission_round_trip() {
        let snapshot = InventorySnapshot {
            clusters: vec![ClusterInventory {
                name: "c1".into(),
                hosts: vec![HostInventory {
                    name: "esx-1".into(),
                    connection_state: ConnectionState::Connected,
                    datastores: vec![datastore("ds1", false, 1000)],
                }],
            }],
            fetched_at: chrono::Utc::now(),
        };
        let config = PlannerConfig {
            buffer_size: 0,
            ..Default::default()
        };
        let mut session = PlacementSession::from_snapshot(&snapshot, config).unwrap();
        let vm = VmRequest::from_spec(VmSpec {
            id: "vm-1".into(),
            name: "app-01".into(),
            req_mem: 64,
            system_size: 100,
            swap_size: 50,
            data_size: 200,
            ..Default::default()
        })
        .unwrap();

        let mut plan = session.plan(&[vm], &hosts(&["esx-1"])).unwrap();
        let chosen = plan.take("esx-1").unwrap();
        assert_eq!(chosen[0].volumes().count(), 3);
        assert_eq!(chosen[0].volumes().map(|v| v.size).sum::<u64>(), 350);

        let pool = |s: &PlacementSession| s.ledger().host("esx-1").unwrap().local["ds1"].reserved_space();
        assert_eq!(session.commission(&chosen).unwrap(), 414);
        assert_eq!(pool(&session), 414);
        session.decommission(&chosen).unwrap();
        assert_eq!(pool(&session), 0);
    }

    #[tokio::test]
    async fn test_realize_committed_plan() {
        let mut session = PlacementSession::from_snapshot(&snapshot(), config()).unwrap();
        let mut plan = session.plan(&[vm()], &hosts(&["esx-2"])).unwrap();
        let chosen = plan.take("esx-2").unwrap();
        session.commission(&chosen).unwrap();

        let provisioner = FakeProvisioner::default();
        let created = session.create_volumes(&provisioner, &chosen[0]).await.unwrap();
        assert_eq!(created.len(), 2);

        session.delete_volumes(&provisioner, &chosen[0]).await.unwrap();
        assert_eq!(provisioner.calls().await.len(), 4);
    }

    #[test]
    fn test_commission_unknown_host() {
        let mut session = PlacementSession::from_snapshot(&snapshot(), config()).unwrap();
        let mut vm = vm();
        vm.host_name = Some("esx-404".into());
        vm.add_volume(crate::request::DiskKind::System, "ds1", false, 100);

        assert_matches!(session.commission(&[vm]), Err(Error::HostNotFound { .. }));
    }
}
