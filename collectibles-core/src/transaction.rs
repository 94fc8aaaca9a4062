use crate::id::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to one output of a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub transaction_id: TransactionId,
    pub output_index: u32,
}

impl OutPoint {
    pub fn new(transaction_id: TransactionId, output_index: u32) -> Self {
        Self {
            transaction_id,
            output_index,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}

/// An output a transaction should create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputToCreate {
    pub value_units: u64,

    pub locking_script: Vec<u8>,

    /// Named collection the output is tracked in
    pub basket: String,

    /// Opaque structured data stored next to the output
    pub metadata: Option<serde_json::Value>,
}

/// A prior output a transaction should consume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputToSpend {
    pub outpoint: OutPoint,

    /// Proof authorizing the spend
    pub unlocking_script: Vec<u8>,
}

/// The ledger's verdict on a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub transaction_id: TransactionId,
    pub accepted: bool,

    /// Why the ledger refused the transaction, when it did
    pub reason: Option<String>,
}

impl SubmitOutcome {
    pub fn accepted(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            accepted: true,
            reason: None,
        }
    }

    pub fn rejected(transaction_id: TransactionId, reason: impl Into<String>) -> Self {
        Self {
            transaction_id,
            accepted: false,
            reason: Some(reason.into()),
        }
    }

    pub fn reason_or_default(&self) -> &str {
        self.reason.as_deref().unwrap_or("rejected by ledger")
    }
}

/// A spendable output as reported by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub transaction_id: TransactionId,
    pub output_index: u32,
    pub locking_script: Vec<u8>,
    pub value_units: u64,
    pub metadata: Option<serde_json::Value>,
}

impl UnspentOutput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.transaction_id, self.output_index)
    }
}
