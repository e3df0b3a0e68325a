//! Placement Engine
//!
//! Greedy per-host, per-VM placement of a batch of VM requests. Each host is
//! tried in turn against the whole batch on its private planning view; a
//! host that cannot fit one VM is dropped for the rest of the batch. The
//! pass is a feasibility simulation: all planning reservations are released
//! before it returns.

use super::attempt::HostAttempt;
use super::candidates::CandidateSelector;
use super::strategy::{place_data, DataOutcome};
use crate::error::{Error, Result};
use crate::ledger::{CapacityLedger, LedgerView};
use crate::request::{DiskKind, VmRequest};
use crate::reservation::ReservationManager;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

// =============================================================================
// Placement Plan
// =============================================================================

/// Result of a planning pass
#[derive(Debug, Clone, Serialize)]
pub struct PlacementPlan {
    /// Hosts that fit the whole batch, with the placed VMs
    pub solutions: BTreeMap<String, Vec<VmRequest>>,
    /// Order hosts were tried in (most local capacity first)
    pub host_order: Vec<String>,
    /// Hosts dropped because a VM did not fit, with the reason
    pub infeasible: BTreeMap<String, String>,
    /// Hosts dropped because they could only pseudo-bisect while another
    /// host bisected onto two pools
    pub pseudo_bisect_dropped: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl PlacementPlan {
    fn new() -> Self {
        Self {
            solutions: BTreeMap::new(),
            host_order: Vec::new(),
            infeasible: BTreeMap::new(),
            pseudo_bisect_dropped: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// Feasible hosts, in the order they were tried
    pub fn hosts(&self) -> Vec<&str> {
        self.host_order
            .iter()
            .filter(|h| self.solutions.contains_key(*h))
            .map(String::as_str)
            .collect()
    }

    pub fn get(&self, host: &str) -> Option<&[VmRequest]> {
        self.solutions.get(host).map(Vec::as_slice)
    }

    pub fn is_feasible(&self, host: &str) -> bool {
        self.solutions.contains_key(host)
    }

    /// Remove and return one host's placed VMs
    pub fn take(&mut self, host: &str) -> Option<Vec<VmRequest>> {
        self.solutions.remove(host)
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }
}

// =============================================================================
// Host Progress
// =============================================================================

/// Bisect results seen on one host during the pass
#[derive(Debug, Default, Clone, Copy)]
struct BisectFlags {
    true_bisect: bool,
    pseudo_bisect: bool,
}

impl BisectFlags {
    fn record(&mut self, outcome: DataOutcome) {
        match outcome {
            DataOutcome::Placed => {}
            DataOutcome::TrueBisect => self.true_bisect = true,
            DataOutcome::PseudoBisect => self.pseudo_bisect = true,
        }
    }
}

// =============================================================================
// Placement Engine
// =============================================================================

/// Engine for planning volume placement
#[derive(Debug, Clone, Copy)]
pub struct PlacementEngine {
    buffer: u64,
}

impl PlacementEngine {
    pub fn new(buffer: u64) -> Self {
        Self { buffer }
    }

    /// Plan `vms` on each of `hosts`. Only configuration problems are
    /// errors; a host that cannot take the batch is simply absent from
    /// the returned solutions.
    pub fn plan(
        &self,
        ledger: &mut CapacityLedger,
        vms: &[VmRequest],
        hosts: &[String],
    ) -> Result<PlacementPlan> {
        for vm in vms {
            if vm.id.is_empty() {
                return Err(Error::Configuration(format!("VM {} has no id", vm.name)));
            }
        }

        let mut plan = PlacementPlan::new();
        plan.host_order = self.order_hosts(ledger, hosts);

        info!(
            "Planning {} VMs across {} candidate hosts",
            vms.len(),
            plan.host_order.len()
        );

        let mut flags: BTreeMap<String, BisectFlags> = BTreeMap::new();

        for host_name in plan.host_order.clone() {
            ledger.host_mut(&host_name)?.begin_planning();

            match self.plan_host(ledger, &host_name, vms) {
                Ok((accepted, host_flags)) => {
                    debug!("Host {} fits all {} VMs", host_name, accepted.len());
                    flags.insert(host_name.clone(), host_flags);
                    plan.solutions.insert(host_name, accepted);
                }
                Err(e) if e.is_infeasible() => {
                    warn!("Dropping host {}: {}", host_name, e);
                    plan.infeasible.insert(host_name, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        self.apply_bisect_fairness(ledger, &mut plan, &flags)?;

        // The plan is a simulation; give back what it reserved
        for (host_name, placed) in &plan.solutions {
            ReservationManager::recovery(ledger, placed)?;
            debug!(
                "Host {}: planning view restored to {} MB",
                host_name,
                ledger.capacity(host_name, LedgerView::Plan)?
            );
        }

        info!(
            "Planning finished: {} feasible, {} infeasible, {} dropped for pseudo-bisect",
            plan.solutions.len(),
            plan.infeasible.len(),
            plan.pseudo_bisect_dropped.len()
        );
        Ok(plan)
    }

    /// Known, connected hosts, most local capacity first
    fn order_hosts(&self, ledger: &CapacityLedger, hosts: &[String]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut ordered: Vec<(u64, String)> = Vec::new();

        for name in hosts {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match ledger.host(name) {
                Some(host) if host.is_connected() => {
                    ordered.push((host.local_capacity(), name.clone()));
                }
                Some(host) => {
                    debug!("Skipping host {} ({})", name, host.connection_state);
                }
                None => warn!("Host {} is not in the inventory", name),
            }
        }

        ordered.sort_by(|(a, _), (b, _)| b.cmp(a));
        ordered.into_iter().map(|(_, name)| name).collect()
    }

    /// Fit the whole batch on one host. On failure every reservation the
    /// host made during this pass has been released.
    fn plan_host(
        &self,
        ledger: &mut CapacityLedger,
        host_name: &str,
        vms: &[VmRequest],
    ) -> Result<(Vec<VmRequest>, BisectFlags)> {
        let mut accepted: Vec<VmRequest> = Vec::with_capacity(vms.len());
        let mut flags = BisectFlags::default();
        let mut sticky: Option<String> = None;

        for template in vms {
            let mut vm = template.clone();
            vm.host_name = Some(host_name.to_string());

            let mut attempt = HostAttempt::new(ledger, host_name, self.buffer);
            match self.place_vm(&mut attempt, &mut vm, &mut sticky) {
                Ok(outcome) => {
                    attempt.commit();
                    flags.record(outcome);
                    accepted.push(vm);
                }
                Err(e) => {
                    attempt.rollback()?;
                    ReservationManager::recovery(ledger, &accepted)?;
                    return Err(e);
                }
            }
        }

        Ok((accepted, flags))
    }

    /// Place one VM: system and swap first, then the data disk
    pub(crate) fn place_vm(
        &self,
        attempt: &mut HostAttempt<'_>,
        vm: &mut VmRequest,
        sticky: &mut Option<String>,
    ) -> Result<DataOutcome> {
        let filter = vm.pool_filter();
        let selector = CandidateSelector::new(attempt.buffer(), filter.as_ref());

        self.place_system_and_swap(attempt, vm, &selector, sticky)?;

        if vm.data.size == 0 {
            return Ok(DataOutcome::Placed);
        }

        let candidates = selector.candidates(
            attempt.host()?,
            LedgerView::Plan,
            &vm.data,
            sticky.as_deref(),
        );
        place_data(attempt, vm, candidates)
    }

    fn place_system_and_swap(
        &self,
        attempt: &mut HostAttempt<'_>,
        vm: &mut VmRequest,
        selector: &CandidateSelector<'_>,
        sticky: &mut Option<String>,
    ) -> Result<()> {
        let candidates = selector.candidates(
            attempt.host()?,
            LedgerView::Plan,
            &vm.system,
            sticky.as_deref(),
        );

        let footprint = vm.system_footprint();
        let system_size = vm.system.size;
        let swap_size = vm.swap.size;
        let system_need = vm.memory_reservation.saturating_add(system_size);
        let available = selector.usable_total(&candidates);
        if available < footprint {
            return Err(attempt.infeasible(
                vm,
                format!(
                    "system and swap need {} MB, candidates offer {} MB",
                    footprint, available
                ),
            ));
        }

        let mut system_done = false;
        let mut swap_done = false;

        for candidate in &candidates {
            let usable = attempt.usable(candidate);

            if !system_done && !swap_done && usable >= footprint {
                attempt.place(vm, DiskKind::System, candidate, system_size)?;
                attempt.place(vm, DiskKind::Swap, candidate, swap_size)?;
                system_done = true;
                swap_done = true;
                *sticky = Some(candidate.name.clone());
                break;
            } else if !system_done && usable >= system_need {
                attempt.place(vm, DiskKind::System, candidate, system_size)?;
                system_done = true;
                if swap_done {
                    break;
                }
            } else if !swap_done && usable >= swap_size {
                attempt.place(vm, DiskKind::Swap, candidate, swap_size)?;
                swap_done = true;
                if system_done {
                    break;
                }
            }
        }

        if system_done && swap_done {
            Ok(())
        } else {
            Err(attempt.infeasible(
                vm,
                format!(
                    "no pool arrangement for system ({} MB) and swap ({} MB)",
                    system_need, swap_size
                ),
            ))
        }
    }

    /// A degraded bisect is only acceptable when no host does better
    fn apply_bisect_fairness(
        &self,
        ledger: &mut CapacityLedger,
        plan: &mut PlacementPlan,
        flags: &BTreeMap<String, BisectFlags>,
    ) -> Result<()> {
        if !flags.values().any(|f| f.true_bisect) {
            return Ok(());
        }

        // Hosts that true-bisected at least once stay
        for (host_name, f) in flags {
            if !f.pseudo_bisect || f.true_bisect {
                continue;
            }
            if let Some(placed) = plan.solutions.remove(host_name) {
                ReservationManager::recovery(ledger, &placed)?;
                info!("Dropping host {}: only a pseudo-bisect was possible", host_name);
                plan.pseudo_bisect_dropped.push(host_name.clone());
            }
        }
        Ok(())
    }
}
