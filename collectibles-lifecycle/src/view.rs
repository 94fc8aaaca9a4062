use collectibles_core::error::CollectibleError;
use collectibles_core::objects::{Card, RedemptionReceipt, TokenRecord};
use collectibles_ledger::ledger_traits::LedgerService;
use collectibles_script::engine::ScriptService;
use log::warn;

use crate::manager::TokenLifecycleManager;

/// The collection as last seen on the ledger.
///
/// Mutations go through the manager and are followed by a fresh listing, so
/// the cached cards never drift from what the ledger reports.
#[derive(Debug)]
pub struct CollectionView<S, L> {
    manager: TokenLifecycleManager<S, L>,
    cards: Vec<TokenRecord>,
}

impl<S: ScriptService, L: LedgerService> CollectionView<S, L> {
    pub fn new(manager: TokenLifecycleManager<S, L>) -> Self {
        Self {
            manager,
            cards: Vec::new(),
        }
    }

    /// Cards from the most recent successful refresh
    pub fn cards(&self) -> &[TokenRecord] {
        &self.cards
    }

    pub fn manager(&self) -> &TokenLifecycleManager<S, L> {
        &self.manager
    }

    /// Reload the collection. On failure the previous listing is kept.
    pub async fn refresh(&mut self) -> Result<&[TokenRecord], CollectibleError> {
        self.cards = self.manager.list().await?;
        Ok(&self.cards)
    }

    pub async fn mint(&mut self, card: &Card) -> Result<TokenRecord, CollectibleError> {
        let record = self.manager.mint(card).await?;
        self.refresh_after("mint").await;
        Ok(record)
    }

    pub async fn redeem(
        &mut self,
        record: &TokenRecord,
    ) -> Result<RedemptionReceipt, CollectibleError> {
        let result = self.manager.redeem(record).await;
        // A rejected spend may mean someone else already redeemed it
        self.refresh_after("redeem").await;
        result
    }

    /// Redeem the card at `index` in the current listing
    pub async fn redeem_at(&mut self, index: usize) -> Result<RedemptionReceipt, CollectibleError> {
        let record = self.cards.get(index).cloned().ok_or_else(|| {
            CollectibleError::InvalidRecord(format!(
                "no card at position {} (collection has {})",
                index,
                self.cards.len()
            ))
        })?;
        self.redeem(&record).await
    }

    async fn refresh_after(&mut self, operation: &str) {
        if let Err(err) = self.refresh().await {
            warn!("Collection refresh after {} failed: {}", operation, err);
        }
    }
}
