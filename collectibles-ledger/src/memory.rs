use async_trait::async_trait;
use collectibles_core::error::LedgerError;
use collectibles_core::id::TransactionId;
use collectibles_core::transaction::{
    InputToSpend, OutPoint, OutputToCreate, SubmitOutcome, UnspentOutput,
};
use collectibles_script::engine::{UnlockVerifier, VerificationResult};
use collectibles_script::pushdrop::PushDropVerifier;
use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ledger_traits::LedgerService;

/// An output recorded by the ledger
#[derive(Debug, Clone)]
struct LedgerEntry {
    outpoint: OutPoint,
    basket: String,
    value_units: u64,
    locking_script: Vec<u8>,
    metadata: Option<serde_json::Value>,
    spent_by: Option<TransactionId>,
}

/// The bytes a transaction id is hashed from
#[derive(Serialize)]
struct TransactionPreimage<'a> {
    sequence: u64,
    outputs: Vec<(u64, &'a [u8], &'a str, Option<String>)>,
    inputs: Vec<(&'a OutPoint, &'a [u8])>,
    memo: &'a str,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Outputs in creation order
    entries: Vec<LedgerEntry>,
    index: HashMap<OutPoint, usize>,
    /// Value the wallet can spend on new outputs
    available_funds: u64,
    /// Bumped per transaction so identical submissions get distinct ids
    sequence: u64,
    /// When set, every request fails with this reason
    unavailable: Option<String>,
    submissions: usize,
    queries: usize,
}

impl LedgerState {
    fn next_transaction_id(
        &mut self,
        outputs: &[OutputToCreate],
        inputs: &[InputToSpend],
        memo: &str,
    ) -> Result<TransactionId, LedgerError> {
        self.sequence += 1;
        let preimage = TransactionPreimage {
            sequence: self.sequence,
            outputs: outputs
                .iter()
                .map(|output| {
                    (
                        output.value_units,
                        output.locking_script.as_slice(),
                        output.basket.as_str(),
                        output.metadata.as_ref().map(|value| value.to_string()),
                    )
                })
                .collect(),
            inputs: inputs
                .iter()
                .map(|input| (&input.outpoint, input.unlocking_script.as_slice()))
                .collect(),
            memo,
        };
        let bytes = bincode::serialize(&preimage)?;
        Ok(TransactionId::new(Sha256::digest(&bytes).into()))
    }

    fn record_outputs(&mut self, transaction_id: TransactionId, outputs: Vec<OutputToCreate>) {
        for (index, output) in outputs.into_iter().enumerate() {
            let outpoint = OutPoint::new(transaction_id, index as u32);
            self.index.insert(outpoint, self.entries.len());
            self.entries.push(LedgerEntry {
                outpoint,
                basket: output.basket,
                value_units: output.value_units,
                locking_script: output.locking_script,
                metadata: output.metadata,
                spent_by: None,
            });
        }
    }

    fn entry(&self, outpoint: &OutPoint) -> Option<&LedgerEntry> {
        self.index.get(outpoint).map(|&position| &self.entries[position])
    }
}

/// Ledger kept entirely in memory
///
/// Checks every spend with an `UnlockVerifier`, spends each output at most once,
/// and debits created value from a funding balance. Useful as a stand-in for a
/// real ledger in tests and demos.
#[derive(Debug)]
pub struct InMemoryLedger<V = PushDropVerifier> {
    state: Mutex<LedgerState>,
    verifier: V,
}

impl InMemoryLedger {
    /// Create an empty ledger that verifies push-drop spends
    pub fn new() -> Self {
        Self::with_verifier(PushDropVerifier)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: UnlockVerifier> InMemoryLedger<V> {
    pub fn with_verifier(verifier: V) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            verifier,
        }
    }

    /// Start with the given funding balance
    pub fn with_funds(self, funds: u64) -> Self {
        self.state().available_funds = funds;
        self
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // Every mutation completes under the lock, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add to the funding balance
    pub fn fund(&self, amount: u64) {
        let mut state = self.state();
        state.available_funds = state.available_funds.saturating_add(amount);
    }

    pub fn available_funds(&self) -> u64 {
        self.state().available_funds
    }

    /// Make every request fail as if the ledger could not be reached; `None` restores service
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.state().unavailable = reason.map(str::to_string);
    }

    /// Number of submissions that reached the ledger, accepted or not
    pub fn submission_count(&self) -> usize {
        self.state().submissions
    }

    pub fn query_count(&self) -> usize {
        self.state().queries
    }

    /// Whether an output exists and has been spent
    pub fn is_spent(&self, outpoint: &OutPoint) -> Option<bool> {
        self.state()
            .entry(outpoint)
            .map(|entry| entry.spent_by.is_some())
    }

    /// Record an output directly, without funding or verification.
    ///
    /// Stands in for outputs other software placed in a collection.
    pub fn insert_output(&self, output: OutputToCreate) -> Result<OutPoint, LedgerError> {
        let mut state = self.state();
        let transaction_id = state.next_transaction_id(std::slice::from_ref(&output), &[], "")?;
        state.record_outputs(transaction_id, vec![output]);
        Ok(OutPoint::new(transaction_id, 0))
    }

    /// Check a transaction against the current state, returning the total input
    /// and output value when it can be applied
    fn check_transaction(
        &self,
        state: &LedgerState,
        outputs: &[OutputToCreate],
        inputs: &[InputToSpend],
    ) -> Result<(u64, u64), String> {
        if outputs.is_empty() && inputs.is_empty() {
            return Err("transaction has no inputs or outputs".to_string());
        }

        let mut seen = HashSet::new();
        for input in inputs {
            if !seen.insert(input.outpoint) {
                return Err(format!("output {} spent twice in one transaction", input.outpoint));
            }
        }

        let mut total_in: u64 = 0;
        for input in inputs {
            let entry = state
                .entry(&input.outpoint)
                .ok_or_else(|| format!("output {} does not exist", input.outpoint))?;
            if let Some(spender) = entry.spent_by {
                return Err(format!(
                    "output {} already spent by {}",
                    input.outpoint, spender
                ));
            }

            let verdict = self.verifier.verify_unlock(
                &entry.locking_script,
                &input.unlocking_script,
                &entry.outpoint.transaction_id,
                entry.outpoint.output_index,
                entry.value_units,
            );
            if let VerificationResult::Invalid(reason) = verdict {
                return Err(format!("unlocking script for {} rejected: {}", input.outpoint, reason));
            }

            total_in = total_in
                .checked_add(entry.value_units)
                .ok_or_else(|| "input value overflow".to_string())?;
        }

        let mut total_out: u64 = 0;
        for (index, output) in outputs.iter().enumerate() {
            if output.value_units == 0 {
                return Err(format!("output {} has zero value", index));
            }
            total_out = total_out
                .checked_add(output.value_units)
                .ok_or_else(|| "output value overflow".to_string())?;
        }

        let spendable = state.available_funds.saturating_add(total_in);
        if total_out > spendable {
            return Err(format!(
                "insufficient funds: need {}, have {}",
                total_out, spendable
            ));
        }

        Ok((total_in, total_out))
    }
}

#[async_trait]
impl<V: UnlockVerifier> LedgerService for InMemoryLedger<V> {
    async fn submit_transaction(
        &self,
        outputs: Vec<OutputToCreate>,
        inputs: Vec<InputToSpend>,
        memo: &str,
    ) -> Result<SubmitOutcome, LedgerError> {
        let mut state = self.state();
        if let Some(reason) = &state.unavailable {
            return Err(LedgerError::Unavailable(reason.clone()));
        }
        state.submissions += 1;

        let transaction_id = state.next_transaction_id(&outputs, &inputs, memo)?;

        let (total_in, total_out) = match self.check_transaction(&state, &outputs, &inputs) {
            Ok(totals) => totals,
            Err(reason) => {
                warn!("Rejected transaction {} ({}): {}", transaction_id, memo, reason);
                return Ok(SubmitOutcome::rejected(transaction_id, reason));
            }
        };

        for input in &inputs {
            if let Some(&position) = state.index.get(&input.outpoint) {
                state.entries[position].spent_by = Some(transaction_id);
            }
        }
        state.available_funds = state.available_funds.saturating_add(total_in) - total_out;
        state.record_outputs(transaction_id, outputs);

        info!(
            "Accepted transaction {} ({}): {} inputs, {} units out",
            transaction_id,
            memo,
            inputs.len(),
            total_out
        );
        Ok(SubmitOutcome::accepted(transaction_id))
    }

    async fn query_unspent_outputs(&self, basket: &str) -> Result<Vec<UnspentOutput>, LedgerError> {
        let mut state = self.state();
        if let Some(reason) = &state.unavailable {
            return Err(LedgerError::Unavailable(reason.clone()));
        }
        state.queries += 1;

        let outputs: Vec<UnspentOutput> = state
            .entries
            .iter()
            .filter(|entry| entry.basket == basket && entry.spent_by.is_none())
            .map(|entry| UnspentOutput {
                transaction_id: entry.outpoint.transaction_id,
                output_index: entry.outpoint.output_index,
                locking_script: entry.locking_script.clone(),
                value_units: entry.value_units,
                metadata: entry.metadata.clone(),
            })
            .collect();

        debug!("Basket '{}' holds {} unspent outputs", basket, outputs.len());
        Ok(outputs)
    }
}
