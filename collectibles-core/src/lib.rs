pub mod config;
pub mod error;
pub mod id;
pub mod objects;
pub mod transaction;

// Re-export the main types for convenience
pub use config::{CollectiblesConfig, COLLECTION_BASKET, PROTOCOL_NAMESPACE};
pub use error::{CollectibleError, LedgerError, ScriptError, Stage};
pub use id::{KeyIdentifier, TransactionId};
pub use objects::{
    AssociatedMetadata, Card, CardAttributes, Rarity, RedemptionReceipt, TokenRecord, TokenState,
};
pub use transaction::{InputToSpend, OutPoint, OutputToCreate, SubmitOutcome, UnspentOutput};
