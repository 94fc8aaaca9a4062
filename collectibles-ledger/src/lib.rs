pub mod ledger_traits;
pub mod memory;

// Re-export the main types for convenience
pub use ledger_traits::LedgerService;
pub use memory::InMemoryLedger;
