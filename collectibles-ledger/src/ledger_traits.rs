use async_trait::async_trait;
use collectibles_core::error::LedgerError;
use collectibles_core::transaction::{InputToSpend, OutputToCreate, SubmitOutcome, UnspentOutput};
use std::sync::Arc;

/// Interface to the ledger that records token outputs
///
/// The ledger owns spendability: it must spend each output at most once,
/// atomically, and report a losing double-spend as a rejected submission.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Submit a transaction creating and/or spending outputs
    ///
    /// # Parameters
    /// * `outputs` - Outputs to create; output `i` gets index `i` in the new transaction
    /// * `inputs` - Prior outputs to spend, each with its unlocking script
    /// * `memo` - Human-readable description of the transaction
    ///
    /// # Returns
    /// The transaction id and whether the ledger accepted it. An `Err` means the
    /// request could not be processed, and the caller cannot tell whether it landed.
    async fn submit_transaction(
        &self,
        outputs: Vec<OutputToCreate>,
        inputs: Vec<InputToSpend>,
        memo: &str,
    ) -> Result<SubmitOutcome, LedgerError>;

    /// List the currently spendable outputs tracked in a collection
    ///
    /// # Parameters
    /// * `basket` - The collection name outputs were tagged with
    ///
    /// # Returns
    /// The unspent outputs with their metadata, in ledger order
    async fn query_unspent_outputs(&self, basket: &str) -> Result<Vec<UnspentOutput>, LedgerError>;
}

#[async_trait]
impl<T: LedgerService + ?Sized> LedgerService for Arc<T> {
    async fn submit_transaction(
        &self,
        outputs: Vec<OutputToCreate>,
        inputs: Vec<InputToSpend>,
        memo: &str,
    ) -> Result<SubmitOutcome, LedgerError> {
        (**self).submit_transaction(outputs, inputs, memo).await
    }

    async fn query_unspent_outputs(&self, basket: &str) -> Result<Vec<UnspentOutput>, LedgerError> {
        (**self).query_unspent_outputs(basket).await
    }
}
