//! Reservation Module
//!
//! Durable commit and rollback of placed VMs against the ledger, and
//! realization of their volumes through the provisioning collaborator.

pub mod manager;
pub mod realization;

pub use manager::ReservationManager;
pub use realization::{create_volumes, delete_volumes};
