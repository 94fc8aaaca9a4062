//! Collectible card tokens
//!
//! This crate re-exports all the components of the collectibles system.

pub use collectibles_core::*;
pub use collectibles_ledger::*;
pub use collectibles_lifecycle::*;
pub use collectibles_script::*;
