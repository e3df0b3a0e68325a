//! Storage Pool
//!
//! A named storage area with live free space and a reserved amount that has
//! been promised to planned or committed volumes but is not yet reflected in
//! the inventory's free-space figure.

use crate::domain::ports::DatastoreInventory;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default headroom (MB) a pool must keep to be considered usable
pub const DEFAULT_BUFFER_SIZE: u64 = 512;

/// A storage pool reachable from a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePool {
    /// Pool name, unique within a host
    pub name: String,
    /// Reachable by more than one host
    pub shared: bool,
    /// Total capacity in MB
    pub total_space: u64,
    /// Free capacity in MB, as last reported by the inventory
    pub free_space: u64,
    /// Speculative and committed usage not yet reflected in `free_space`
    reserved_space: u64,
}

impl StoragePool {
    pub fn new(name: impl Into<String>, shared: bool, total_space: u64, free_space: u64) -> Self {
        Self {
            name: name.into(),
            shared,
            total_space,
            free_space,
            reserved_space: 0,
        }
    }

    /// Reserved space in MB
    pub fn reserved_space(&self) -> u64 {
        self.reserved_space
    }

    /// Free space net of reservations, never negative
    #[inline]
    pub fn effective_free(&self) -> u64 {
        self.free_space.saturating_sub(self.reserved_space)
    }

    /// Free space left after keeping `buffer` MB of headroom
    #[inline]
    pub fn usable(&self, buffer: u64) -> u64 {
        self.effective_free().saturating_sub(buffer)
    }

    /// Whether the pool still has more headroom than the safety buffer
    #[inline]
    pub fn is_usable(&self, buffer: u64) -> bool {
        self.effective_free() >= buffer
    }

    pub(crate) fn reserve(&mut self, amount: u64) {
        self.reserved_space = self.reserved_space.saturating_add(amount);
    }

    pub(crate) fn release(&mut self, amount: u64) {
        if amount > self.reserved_space {
            warn!(
                "Release of {} MB on pool {} exceeds its reservation of {} MB",
                amount, self.name, self.reserved_space
            );
        }
        self.reserved_space = self.reserved_space.saturating_sub(amount);
    }
}

impl From<&DatastoreInventory> for StoragePool {
    fn from(ds: &DatastoreInventory) -> Self {
        StoragePool::new(ds.name.clone(), ds.shared, ds.total_space, ds.free_space)
    }
}
