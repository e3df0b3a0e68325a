//! Request Model
//!
//! VM and disk requests handed to the placement engine, and the volumes
//! placement resolves them into.

pub mod disk;
pub mod vm;

pub use disk::*;
pub use vm::*;
