use chrono::Utc;
use collectibles_core::config::CollectiblesConfig;
use collectibles_core::error::CollectibleError;
use collectibles_core::id::KeyIdentifier;
use collectibles_core::objects::{
    AssociatedMetadata, Card, RedemptionReceipt, TokenRecord, TokenState,
};
use collectibles_core::transaction::{InputToSpend, OutputToCreate, UnspentOutput};
use collectibles_ledger::ledger_traits::LedgerService;
use collectibles_script::engine::ScriptService;
use log::{debug, info, warn};

use crate::codec::CardCodec;

/// Memo attached to every mint transaction
pub const MINT_MEMO: &str = "Creating a new collectible card";

/// Memo prefix for redemption transactions; the card name follows
pub const REDEEM_MEMO_PREFIX: &str = "Redeeming collectible card";

/// Drives cards through Draft -> Minted -> Redeemed.
///
/// The manager keeps no state of its own: the ledger is the source of truth
/// for which tokens exist and which are spendable.
#[derive(Debug)]
pub struct TokenLifecycleManager<S, L> {
    codec: CardCodec<S>,
    ledger: L,
    config: CollectiblesConfig,
}

impl<S: ScriptService, L: LedgerService> TokenLifecycleManager<S, L> {
    /// Create a manager using the default namespace and collection
    pub fn new(script_service: S, ledger: L) -> Self {
        Self {
            codec: CardCodec::new(script_service),
            ledger,
            config: CollectiblesConfig::default(),
        }
    }

    pub fn with_config(
        script_service: S,
        ledger: L,
        config: CollectiblesConfig,
    ) -> Result<Self, CollectibleError> {
        config.validate()?;
        Ok(Self {
            codec: CardCodec::new(script_service)
                .embedding_key_id(config.embed_key_id)
                .with_max_field_len(config.max_field_len),
            ledger,
            config,
        })
    }

    pub fn config(&self) -> &CollectiblesConfig {
        &self.config
    }

    pub fn codec(&self) -> &CardCodec<S> {
        &self.codec
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mint a card as a new output in the collection.
    ///
    /// Every call uses a freshly generated key identifier, so retrying after a
    /// failure can never be confused with the failed attempt.
    pub async fn mint(&self, card: &Card) -> Result<TokenRecord, CollectibleError> {
        card.validate()?;

        let key_id = KeyIdentifier::generate();
        let attributes = card.attributes();
        let locking_script = self
            .codec
            .encode(&attributes, &self.config.protocol_namespace, &key_id)
            .await?;

        let metadata = AssociatedMetadata::new(&key_id, card.history.clone());
        let output = OutputToCreate {
            value_units: card.value_units,
            locking_script: locking_script.clone(),
            basket: self.config.basket.clone(),
            metadata: Some(metadata.to_value()?),
        };

        let outcome = self
            .ledger
            .submit_transaction(vec![output], Vec::new(), MINT_MEMO)
            .await
            .map_err(|err| CollectibleError::MintSubmission(err.to_string()))?;
        if !outcome.accepted {
            warn!(
                "Ledger rejected mint of '{}': {}",
                card.name,
                outcome.reason_or_default()
            );
            return Err(CollectibleError::MintSubmission(
                outcome.reason_or_default().to_string(),
            ));
        }

        info!(
            "Minted '{}' ({} units) in {}",
            card.name, card.value_units, outcome.transaction_id
        );
        Ok(TokenRecord {
            transaction_id: outcome.transaction_id,
            output_index: 0,
            locking_script,
            value_units: card.value_units,
            metadata,
            attributes: Some(attributes),
            state: TokenState::Minted,
        })
    }

    /// List every spendable card in the collection.
    ///
    /// Outputs whose scripts do not decode as cards are skipped.
    pub async fn list(&self) -> Result<Vec<TokenRecord>, CollectibleError> {
        let outputs = self
            .ledger
            .query_unspent_outputs(&self.config.basket)
            .await
            .map_err(|err| CollectibleError::LedgerQuery(err.to_string()))?;

        let mut records = Vec::with_capacity(outputs.len());
        for output in outputs {
            if let Some(record) = self.record_from_output(output).await {
                records.push(record);
            }
        }

        debug!(
            "Listed {} cards in basket '{}'",
            records.len(),
            self.config.basket
        );
        Ok(records)
    }

    async fn record_from_output(&self, output: UnspentOutput) -> Option<TokenRecord> {
        let decoded = match self.codec.decode_card(&output.locking_script).await {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("Skipping {}: {}", output.outpoint(), err);
                return None;
            }
        };

        let mut metadata = match output.metadata.as_ref().map(AssociatedMetadata::from_value) {
            Some(Ok(metadata)) => metadata,
            Some(Err(err)) => {
                warn!("Ignoring malformed metadata on {}: {}", output.outpoint(), err);
                AssociatedMetadata::default()
            }
            None => AssociatedMetadata::default(),
        };
        if let Some(key_id) = decoded.key_identifier {
            metadata.key_id = key_id.to_string();
        }

        Some(TokenRecord {
            transaction_id: output.transaction_id,
            output_index: output.output_index,
            locking_script: output.locking_script,
            value_units: output.value_units,
            metadata,
            attributes: Some(decoded.attributes),
            state: TokenState::Minted,
        })
    }

    /// Spend a minted card's output.
    ///
    /// A ledger rejection (already spent, bad proof) leaves the token minted
    /// and is reported as a redemption error.
    pub async fn redeem(&self, record: &TokenRecord) -> Result<RedemptionReceipt, CollectibleError> {
        if record.transaction_id.is_empty() {
            return Err(CollectibleError::InvalidRecord(
                "token record has no transaction id".to_string(),
            ));
        }
        if record.locking_script.is_empty() {
            return Err(CollectibleError::InvalidRecord(
                "token record has no locking script".to_string(),
            ));
        }
        match record.state {
            TokenState::Minted => {}
            TokenState::Redeemed => {
                return Err(CollectibleError::redemption_rejected(format!(
                    "{} was already redeemed",
                    record.outpoint()
                )))
            }
            TokenState::Draft => {
                return Err(CollectibleError::InvalidRecord(
                    "token record was never minted".to_string(),
                ))
            }
        }
        // Validate, but derive from the identifier text exactly as stored
        record.metadata.key_identifier()?;

        let unlocking_script = self
            .codec
            .build_unlocking_proof(
                &self.config.protocol_namespace,
                &record.metadata.key_id,
                &record.transaction_id,
                record.output_index,
                &record.locking_script,
                record.value_units,
            )
            .await?;

        let input = InputToSpend {
            outpoint: record.outpoint(),
            unlocking_script,
        };
        let memo = format!("{}: {}", REDEEM_MEMO_PREFIX, record.display_name());

        let outcome = self
            .ledger
            .submit_transaction(Vec::new(), vec![input], &memo)
            .await
            .map_err(|err| CollectibleError::Redemption {
                reason: err.to_string(),
                outcome_known: false,
            })?;
        if !outcome.accepted {
            warn!(
                "Ledger rejected redemption of {}: {}",
                record.outpoint(),
                outcome.reason_or_default()
            );
            return Err(CollectibleError::redemption_rejected(
                outcome.reason_or_default(),
            ));
        }

        info!(
            "Redeemed '{}' from {} in {}",
            record.display_name(),
            record.outpoint(),
            outcome.transaction_id
        );
        let mut redeemed = record.clone();
        redeemed.state = TokenState::Redeemed;
        Ok(RedemptionReceipt {
            transaction_id: outcome.transaction_id,
            record: redeemed,
            redeemed_at: Utc::now(),
        })
    }
}
