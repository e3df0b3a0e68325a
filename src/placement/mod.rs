//! Placement Module
//!
//! Candidate ranking, data-disk strategies, the per-host placement engine
//! and the capacity pre-filter.

mod attempt;
pub mod candidates;
pub mod capacity;
pub mod engine;
pub mod strategy;

pub use candidates::*;
pub use capacity::*;
pub use engine::*;
pub use strategy::DataOutcome;
