use async_trait::async_trait;
use collectibles_core::error::ScriptError;
use collectibles_core::id::TransactionId;

/// Represents the result of checking an unlocking script against a locking script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// The unlocking script authorizes the spend
    Valid,

    /// The unlocking script does not authorize the spend, for the specified reason
    Invalid(String),
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid)
    }
}

/// Interface to a service that builds and parses token scripts
///
/// A ScriptService binds data fields to a key derived from a protocol namespace
/// and a key identifier. It guarantees:
///
/// 1. Recoverability - fields passed to `encode_fields` come back unchanged from `decode_fields`
/// 2. Ownership - only a proof built from the same namespace and key identifier can spend the output
#[async_trait]
pub trait ScriptService: Send + Sync {
    /// Build a locking script carrying the given fields
    ///
    /// # Parameters
    /// * `fields` - The data fields to embed, in order
    /// * `namespace` - The protocol namespace the key is derived under
    /// * `key_id` - The per-token key identifier
    ///
    /// # Returns
    /// The locking script bytes. Output need not be deterministic.
    async fn encode_fields(
        &self,
        fields: &[Vec<u8>],
        namespace: &str,
        key_id: &str,
    ) -> Result<Vec<u8>, ScriptError>;

    /// Recover the fields embedded in a locking script
    ///
    /// # Parameters
    /// * `script` - The locking script bytes
    ///
    /// # Returns
    /// The embedded fields, or a decoding error if the script was not built by this service
    async fn decode_fields(&self, script: &[u8]) -> Result<Vec<Vec<u8>>, ScriptError>;

    /// Build an unlocking script that spends a previously created output
    ///
    /// # Parameters
    /// * `namespace` - The protocol namespace used when the output was locked
    /// * `key_id` - The key identifier used when the output was locked
    /// * `prev_tx` - The transaction that created the output
    /// * `output_index` - The position of the output in that transaction
    /// * `locking_script` - The output's locking script
    /// * `value_units` - The output's value
    ///
    /// # Returns
    /// The unlocking script bytes, or a key derivation error if no key can be derived
    async fn build_unlock_proof(
        &self,
        namespace: &str,
        key_id: &str,
        prev_tx: &TransactionId,
        output_index: u32,
        locking_script: &[u8],
        value_units: u64,
    ) -> Result<Vec<u8>, ScriptError>;
}

/// Checks spend authorization on behalf of a ledger.
///
/// Verification only uses public data, so ledgers can hold a verifier without
/// any key material.
pub trait UnlockVerifier: Send + Sync {
    fn verify_unlock(
        &self,
        locking_script: &[u8],
        unlocking_script: &[u8],
        prev_tx: &TransactionId,
        output_index: u32,
        value_units: u64,
    ) -> VerificationResult;
}
