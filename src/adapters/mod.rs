//! Adapters
//!
//! Implementations of the collaborator ports in [`crate::domain::ports`].

pub mod file_inventory;

pub use file_inventory::FileInventory;
