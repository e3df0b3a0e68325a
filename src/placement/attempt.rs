//! Host Attempt
//!
//! One VM tried against one host, as a transaction over the host's planning
//! view. Every reservation made is recorded so the whole attempt can be
//! undone if the VM does not fit.

use super::candidates::Candidate;
use crate::error::{Error, Result};
use crate::ledger::{CapacityLedger, Host, LedgerView};
use crate::request::{DiskKind, VmRequest};
use tracing::{debug, trace};

/// A reservation to undo on rollback
#[derive(Debug, Clone, PartialEq, Eq)]
struct Compensation {
    shared: bool,
    pool: String,
    amount: u64,
}

/// Speculative placement of one VM on one host
pub(crate) struct HostAttempt<'l> {
    ledger: &'l mut CapacityLedger,
    host: String,
    buffer: u64,
    compensation: Vec<Compensation>,
}

impl<'l> HostAttempt<'l> {
    pub(crate) fn new(ledger: &'l mut CapacityLedger, host: &str, buffer: u64) -> Self {
        Self {
            ledger,
            host: host.to_string(),
            buffer,
            compensation: Vec::new(),
        }
    }

    pub(crate) fn host(&self) -> Result<&Host> {
        self.ledger.host(&self.host).ok_or_else(|| Error::HostNotFound {
            host: self.host.clone(),
        })
    }

    pub(crate) fn host_name(&self) -> &str {
        &self.host
    }

    pub(crate) fn buffer(&self) -> u64 {
        self.buffer
    }

    /// Current usable space of a candidate, buffer kept back
    pub(crate) fn usable(&self, candidate: &Candidate) -> u64 {
        self.ledger
            .pool(&self.host, LedgerView::Plan, candidate.shared, &candidate.name)
            .map(|p| p.usable(self.buffer))
            .unwrap_or(0)
    }

    /// Put `size` MB of `kind` on `candidate` and reserve it. Empty
    /// placements are skipped.
    pub(crate) fn place(
        &mut self,
        vm: &mut VmRequest,
        kind: DiskKind,
        candidate: &Candidate,
        size: u64,
    ) -> Result<()> {
        if size == 0 {
            return Ok(());
        }

        let volume = vm.add_volume(kind, &candidate.name, candidate.shared, size);
        let charge = volume.ledger_charge(vm.memory_reservation);
        self.ledger.reserve(
            &self.host,
            LedgerView::Plan,
            candidate.shared,
            &candidate.name,
            charge,
        )?;
        self.compensation.push(Compensation {
            shared: candidate.shared,
            pool: candidate.name.clone(),
            amount: charge,
        });

        trace!(
            "Host {}: {} volume {} ({} MB) on {}",
            self.host, kind, volume.full_path, size, candidate.name
        );
        Ok(())
    }

    /// Build the error that drops this host
    pub(crate) fn infeasible(&self, vm: &VmRequest, reason: impl Into<String>) -> Error {
        Error::Infeasible {
            vm: vm.name.clone(),
            host: self.host.clone(),
            reason: reason.into(),
        }
    }

    /// Keep the reservations
    pub(crate) fn commit(self) {
        debug!(
            "Host {}: attempt kept {} reservations",
            self.host,
            self.compensation.len()
        );
    }

    /// Undo every reservation of this attempt, newest first
    pub(crate) fn rollback(mut self) -> Result<()> {
        for c in self.compensation.iter().rev() {
            self.ledger
                .release(&self.host, LedgerView::Plan, c.shared, &c.pool, c.amount)?;
        }
        debug!(
            "Host {}: rolled back {} reservations",
            self.host,
            self.compensation.len()
        );
        Ok(())
    }
}
