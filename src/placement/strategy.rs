//! Data Disk Strategies
//!
//! Three ways to spread a data disk over the candidate pools of a host:
//!
//! - **Bisect**: two equal halves on the two most-free pools, or both halves
//!   on one pool when only one can take them (a pseudo-bisect).
//! - **Affinity**: first-fit over pools ranked most-free first, so the disk
//!   lands on as few pools as possible.
//! - **Anti-affinity**: an even share on every candidate; pools too small
//!   for the share are filled to their buffer and the share is recomputed
//!   over what is left.

use super::attempt::HostAttempt;
use super::candidates::Candidate;
use crate::error::Result;
use crate::request::{DataLayout, DiskKind, VmRequest};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a data disk ended up placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOutcome {
    /// No bisect involved (or nothing to place)
    Placed,
    /// Halves on two distinct pools
    TrueBisect,
    /// Both halves on the only pool that could take them
    PseudoBisect,
}

/// Place the VM's data disk with the strategy its layout selects
pub(crate) fn place_data(
    attempt: &mut HostAttempt<'_>,
    vm: &mut VmRequest,
    candidates: Vec<Candidate>,
) -> Result<DataOutcome> {
    match vm.data.layout() {
        DataLayout::Bisect => bisect(attempt, vm, candidates),
        DataLayout::Affinity => affinity(attempt, vm, candidates).map(|_| DataOutcome::Placed),
        DataLayout::AntiAffinity => {
            anti_affinity(attempt, vm, candidates).map(|_| DataOutcome::Placed)
        }
    }
}

fn bisect(
    attempt: &mut HostAttempt<'_>,
    vm: &mut VmRequest,
    candidates: Vec<Candidate>,
) -> Result<DataOutcome> {
    let size = vm.data.size;
    let first = size / 2;
    let second = size - first;

    let mut fits: Vec<(u64, Candidate)> = candidates
        .into_iter()
        .map(|c| (attempt.usable(&c), c))
        .filter(|(usable, _)| *usable >= second)
        .collect();
    fits.sort_by(|(a, ca), (b, cb)| b.cmp(a).then_with(|| ca.name.cmp(&cb.name)));

    match fits.as_slice() {
        [(_, a), (_, b), ..] => {
            attempt.place(vm, DiskKind::Data, a, first)?;
            attempt.place(vm, DiskKind::Data, b, second)?;
            Ok(DataOutcome::TrueBisect)
        }
        [(usable, only)] if *usable >= size => {
            debug!(
                "Host {}: only {} can take both halves of {}",
                attempt.host_name(),
                only.name,
                vm.name
            );
            attempt.place(vm, DiskKind::Data, only, first)?;
            attempt.place(vm, DiskKind::Data, only, second)?;
            Ok(DataOutcome::PseudoBisect)
        }
        _ => Err(attempt.infeasible(
            vm,
            format!("no pool can take a {} MB half of the data disk", second),
        )),
    }
}

fn affinity(attempt: &mut HostAttempt<'_>, vm: &mut VmRequest, candidates: Vec<Candidate>) -> Result<()> {
    let mut remaining = vm.data.size;

    for candidate in &candidates {
        let take = remaining.min(attempt.usable(candidate));
        if take == 0 {
            continue;
        }
        attempt.place(vm, DiskKind::Data, candidate, take)?;
        remaining -= take;
        if remaining == 0 {
            return Ok(());
        }
    }

    Err(attempt.infeasible(
        vm,
        format!("{} MB of the data disk left without a pool", remaining),
    ))
}

fn anti_affinity(
    attempt: &mut HostAttempt<'_>,
    vm: &mut VmRequest,
    candidates: Vec<Candidate>,
) -> Result<()> {
    // Smallest pools first: once one can take the even share, every pool
    // after it can too.
    let mut pools: Vec<(u64, Candidate)> = candidates
        .into_iter()
        .map(|c| (attempt.usable(&c), c))
        .collect();
    pools.sort_by(|(a, ca), (b, cb)| a.cmp(b).then_with(|| ca.name.cmp(&cb.name)));

    let mut remaining = vm.data.size;
    for i in 0..pools.len() {
        let count = (pools.len() - i) as u64;
        let share = remaining.div_ceil(count);
        let (usable, _) = &pools[i];

        if *usable >= share {
            let base = remaining / count;
            let extra = remaining % count;
            for (j, (_, pool)) in pools[i..].iter().enumerate() {
                // Larger pools, at the tail, absorb the remainder
                let bump = u64::from((j as u64) >= count - extra);
                attempt.place(vm, DiskKind::Data, pool, base + bump)?;
            }
            return Ok(());
        }

        let (usable, pool) = &pools[i];
        attempt.place(vm, DiskKind::Data, pool, *usable)?;
        remaining -= *usable;
    }

    Err(attempt.infeasible(
        vm,
        format!("{} MB of the data disk left without a pool", remaining),
    ))
}
