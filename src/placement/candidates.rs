//! Candidate Selection
//!
//! Filters and ranks the pools of a host for one disk request.

use crate::ledger::{Host, LedgerView, StoragePool};
use crate::request::DiskRequest;

/// A pool that may receive a volume, as it looked when ranked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub shared: bool,
    pub effective_free: u64,
}

impl From<&StoragePool> for Candidate {
    fn from(pool: &StoragePool) -> Self {
        Self {
            name: pool.name.clone(),
            shared: pool.shared,
            effective_free: pool.effective_free(),
        }
    }
}

/// Ranks pools against a safety buffer and an optional name pattern
#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector<'a> {
    buffer: u64,
    filter: Option<&'a glob::Pattern>,
}

impl<'a> CandidateSelector<'a> {
    pub fn new(buffer: u64, filter: Option<&'a glob::Pattern>) -> Self {
        Self { buffer, filter }
    }

    pub fn buffer(&self) -> u64 {
        self.buffer
    }

    /// Scope a disk is served from on this host. Shared disks fall back to
    /// local pools when the host reaches no shared pool.
    pub fn scope(host: &Host, view: LedgerView, disk: &DiskRequest) -> bool {
        disk.shared && !host.pools(view, true).is_empty()
    }

    /// Usable pools for `disk`, most free first, with the sticky pool (if
    /// still a candidate) moved to the front.
    pub fn candidates(
        &self,
        host: &Host,
        view: LedgerView,
        disk: &DiskRequest,
        sticky: Option<&str>,
    ) -> Vec<Candidate> {
        let shared = Self::scope(host, view, disk);

        let mut candidates: Vec<Candidate> = host
            .pools(view, shared)
            .values()
            .filter(|p| self.filter.map_or(true, |f| f.matches(&p.name)))
            .filter(|p| p.is_usable(self.buffer))
            .map(Candidate::from)
            .collect();

        candidates.sort_by(|a, b| {
            b.effective_free
                .cmp(&a.effective_free)
                .then_with(|| a.name.cmp(&b.name))
        });

        if let Some(sticky) = sticky {
            if let Some(pos) = candidates.iter().position(|c| c.name == sticky) {
                let pool = candidates.remove(pos);
                candidates.insert(0, pool);
            }
        }

        candidates
    }

    /// Space the candidates can give after keeping the buffer on each
    pub fn usable_total(&self, candidates: &[Candidate]) -> u64 {
        candidates
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.effective_free.saturating_sub(self.buffer)))
    }
}
