use async_trait::async_trait;
use collectibles_core::config::{CollectiblesConfig, COLLECTION_BASKET, PROTOCOL_NAMESPACE};
use collectibles_core::error::{CollectibleError, LedgerError, Stage};
use collectibles_core::id::KeyIdentifier;
use collectibles_core::objects::{AssociatedMetadata, Card, Rarity, TokenState};
use collectibles_core::transaction::{InputToSpend, OutputToCreate, SubmitOutcome, UnspentOutput};
use collectibles_ledger::ledger_traits::LedgerService;
use collectibles_ledger::memory::InMemoryLedger;
use collectibles_lifecycle::TokenLifecycleManager;
use collectibles_script::engine::ScriptService;
use collectibles_script::keys::KeyDeriver;
use collectibles_script::pushdrop::PushDropEngine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every call before passing it to the in-memory ledger
#[derive(Default)]
struct CountingLedger {
    inner: Arc<InMemoryLedger>,
    submissions: AtomicUsize,
    queries: AtomicUsize,
    memos: Mutex<Vec<String>>,
}

impl CountingLedger {
    fn with_funds(funds: u64) -> Self {
        Self {
            inner: Arc::new(InMemoryLedger::new().with_funds(funds)),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.submissions.load(Ordering::SeqCst) + self.queries.load(Ordering::SeqCst)
    }

    fn memos(&self) -> Vec<String> {
        self.memos.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerService for CountingLedger {
    async fn submit_transaction(
        &self,
        outputs: Vec<OutputToCreate>,
        inputs: Vec<InputToSpend>,
        memo: &str,
    ) -> Result<SubmitOutcome, LedgerError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.memos.lock().unwrap().push(memo.to_string());
        self.inner.submit_transaction(outputs, inputs, memo).await
    }

    async fn query_unspent_outputs(&self, basket: &str) -> Result<Vec<UnspentOutput>, LedgerError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query_unspent_outputs(basket).await
    }
}

type Manager = TokenLifecycleManager<PushDropEngine, Arc<CountingLedger>>;

fn setup(funds: u64) -> (Manager, Arc<CountingLedger>) {
    let ledger = Arc::new(CountingLedger::with_funds(funds));
    let engine = PushDropEngine::new(KeyDeriver::new([7u8; 32]));
    (TokenLifecycleManager::new(engine, ledger.clone()), ledger)
}

fn dragon() -> Card {
    Card::new("Dragon", "Fire breather", Rarity::Rare, "Burn", 5).with_history("Found in cave")
}

fn knight() -> Card {
    Card::new("Knight", "Loyal guard", Rarity::Common, "Shield wall", 1)
}

#[tokio::test]
async fn test_mint_list_redeem_round_trip() {
    let (manager, ledger) = setup(100);

    let minted = manager.mint(&dragon()).await.unwrap();
    assert_eq!(minted.state, TokenState::Minted);
    assert_eq!(ledger.memos(), vec!["Creating a new collectible card".to_string()]);

    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    let record = &listed[0];
    assert_eq!(record.transaction_id, minted.transaction_id);
    assert_eq!(record.output_index, minted.output_index);
    assert_eq!(record.value_units, 5);
    assert_eq!(record.attributes, Some(dragon().attributes()));
    assert_eq!(record.metadata, minted.metadata);
    assert_eq!(record.metadata.history, "Found in cave");

    let receipt = manager.redeem(record).await.unwrap();
    assert_eq!(receipt.record.state, TokenState::Redeemed);
    assert_eq!(
        ledger.memos().last().map(String::as_str),
        Some("Redeeming collectible card: Dragon")
    );
    assert!(ledger.inner.is_spent(&record.outpoint()).unwrap());
    assert!(manager.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_value_card_never_reaches_ledger() {
    let (manager, ledger) = setup(100);
    let mut card = dragon();
    card.value_units = 0;

    let err = manager.mint(&card).await.unwrap_err();
    assert!(matches!(err, CollectibleError::Validation(_)));
    assert_eq!(err.stage(), Stage::Validate);

    let mut card = dragon();
    card.rarity = Rarity::Legendary;
    card.name = "   ".to_string();
    assert!(matches!(manager.mint(&card).await, Err(CollectibleError::Validation(_))));

    assert_eq!(ledger.calls(), 0);
}

#[tokio::test]
async fn test_empty_history_is_allowed() {
    let (manager, _) = setup(100);

    let record = manager.mint(&knight()).await.unwrap();
    assert_eq!(record.metadata.history, "");
    assert_eq!(manager.list().await.unwrap()[0].metadata.history, "");
}

#[tokio::test]
async fn test_identical_cards_get_distinct_keys() {
    let (manager, _) = setup(100);

    let first = manager.mint(&dragon()).await.unwrap();
    let second = manager.mint(&dragon()).await.unwrap();
    assert_ne!(first.metadata.key_id, second.metadata.key_id);
    assert_ne!(first.locking_script, second.locking_script);
    assert_ne!(first.transaction_id, second.transaction_id);

    let keys: Vec<KeyIdentifier> = manager
        .list()
        .await
        .unwrap()
        .iter()
        .map(|record| record.metadata.key_identifier().unwrap())
        .collect();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
}

#[tokio::test]
async fn test_wrong_key_identifier_cannot_unlock() {
    let (manager, ledger) = setup(100);
    let first = manager.mint(&dragon()).await.unwrap();
    let second = manager.mint(&knight()).await.unwrap();

    let mut forged = first.clone();
    forged.metadata.key_id = second.metadata.key_id.clone();

    let err = manager.redeem(&forged).await.unwrap_err();
    assert!(matches!(err, CollectibleError::Redemption { outcome_known: true, .. }));
    assert!(err.is_retry_safe());
    assert!(!ledger.inner.is_spent(&first.outpoint()).unwrap());
    assert_eq!(manager.list().await.unwrap().len(), 2);

    // The genuine record still redeems
    manager.redeem(&first).await.unwrap();
}

#[tokio::test]
async fn test_second_redeem_is_rejected() {
    let (manager, _) = setup(100);
    let record = manager.mint(&dragon()).await.unwrap();

    manager.redeem(&record).await.unwrap();
    let err = manager.redeem(&record).await.unwrap_err();
    match err {
        CollectibleError::Redemption {
            reason,
            outcome_known,
        } => {
            assert!(outcome_known);
            assert!(reason.contains("already spent"), "unexpected reason: {}", reason);
        }
        other => panic!("expected a redemption error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_redeems_spend_once() {
    let (manager, ledger) = setup(100);
    let record = manager.mint(&dragon()).await.unwrap();

    let (first, second) = tokio::join!(manager.redeem(&record), manager.redeem(&record));
    let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);

    let failure = first.err().or(second.err()).unwrap();
    assert!(matches!(failure, CollectibleError::Redemption { outcome_known: true, .. }));
    assert!(ledger.inner.is_spent(&record.outpoint()).unwrap());
}

#[tokio::test]
async fn test_list_skips_foreign_outputs() {
    let (manager, ledger) = setup(100);
    manager.mint(&dragon()).await.unwrap();

    // Not a script at all
    ledger
        .inner
        .insert_output(OutputToCreate {
            value_units: 1,
            locking_script: vec![0xde, 0xad, 0xbe, 0xef],
            basket: COLLECTION_BASKET.to_string(),
            metadata: None,
        })
        .unwrap();

    // A valid card, but tracked in another collection
    let other = manager
        .codec()
        .encode(&knight().attributes(), PROTOCOL_NAMESPACE, &KeyIdentifier::generate())
        .await
        .unwrap();
    ledger
        .inner
        .insert_output(OutputToCreate {
            value_units: 1,
            locking_script: other,
            basket: "other_collectibles".to_string(),
            metadata: None,
        })
        .unwrap();

    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].display_name(), "Dragon");
    assert_eq!(listed[0].metadata.history, "Found in cave");
}

#[tokio::test]
async fn test_retry_after_failed_mint_uses_new_key() {
    let (manager, ledger) = setup(3);

    let err = manager.mint(&dragon()).await.unwrap_err();
    assert!(matches!(err, CollectibleError::MintSubmission(_)));
    assert!(err.is_retry_safe());
    assert!(manager.list().await.unwrap().is_empty());

    ledger.inner.fund(10);
    let record = manager.mint(&dragon()).await.unwrap();
    assert_eq!(manager.list().await.unwrap().len(), 1);
    assert_eq!(ledger.inner.available_funds(), 8);
    assert!(record.metadata.key_identifier().is_ok());
}

#[tokio::test]
async fn test_unreachable_ledger_during_redeem() {
    let (manager, ledger) = setup(100);
    let record = manager.mint(&dragon()).await.unwrap();

    ledger.inner.set_unavailable(Some("connection reset"));
    let err = manager.redeem(&record).await.unwrap_err();
    assert!(matches!(err, CollectibleError::Redemption { outcome_known: false, .. }));
    assert!(!err.is_retry_safe());

    ledger.inner.set_unavailable(None);
    assert_eq!(manager.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_incomplete_record_makes_no_ledger_call() {
    let (manager, ledger) = setup(100);
    let mut record = manager.mint(&dragon()).await.unwrap();
    record.metadata = AssociatedMetadata::default();
    let calls = ledger.calls();

    let err = manager.redeem(&record).await.unwrap_err();
    assert!(matches!(err, CollectibleError::InvalidRecord(_)));
    assert_eq!(err.stage(), Stage::Redeem);
    assert_eq!(ledger.calls(), calls);
}

#[tokio::test]
async fn test_invalid_namespace_is_a_key_derivation_error() {
    let config = CollectiblesConfig {
        protocol_namespace: "cards protocol".to_string(),
        ..CollectiblesConfig::default()
    };
    let ledger = Arc::new(CountingLedger::with_funds(100));
    let manager =
        TokenLifecycleManager::with_config(PushDropEngine::random(), ledger.clone(), config).unwrap();

    let err = manager.mint(&dragon()).await.unwrap_err();
    assert!(matches!(err, CollectibleError::KeyDerivation { stage: Stage::Encode, .. }));
    assert_eq!(ledger.calls(), 0);
}

#[tokio::test]
async fn test_embedded_key_survives_lost_metadata() {
    let config = CollectiblesConfig::from_json_str(r#"{"embed_key_id": true}"#).unwrap();
    let ledger = Arc::new(CountingLedger::with_funds(100));
    let manager = TokenLifecycleManager::with_config(
        PushDropEngine::new(KeyDeriver::new([9u8; 32])),
        ledger.clone(),
        config,
    )
    .unwrap();

    let minted = manager.mint(&dragon()).await.unwrap();

    // Same script recorded again without any metadata
    let orphan = ledger
        .inner
        .insert_output(OutputToCreate {
            value_units: 2,
            locking_script: minted.locking_script.clone(),
            basket: COLLECTION_BASKET.to_string(),
            metadata: None,
        })
        .unwrap();

    let listed = manager.list().await.unwrap();
    let record = listed
        .iter()
        .find(|record| record.outpoint() == orphan)
        .unwrap();
    assert_eq!(record.metadata.key_id, minted.metadata.key_id);
    assert_eq!(record.metadata.history, "");

    manager.redeem(record).await.unwrap();
    assert!(ledger.inner.is_spent(&orphan).unwrap());
    assert!(!ledger.inner.is_spent(&minted.outpoint()).unwrap());
}

#[tokio::test]
async fn test_lost_metadata_without_embedding_is_invalid() {
    let (manager, ledger) = setup(100);
    let minted = manager.mint(&dragon()).await.unwrap();

    ledger
        .inner
        .insert_output(OutputToCreate {
            value_units: 2,
            locking_script: minted.locking_script.clone(),
            basket: COLLECTION_BASKET.to_string(),
            metadata: Some(serde_json::json!({"keyID": 42})),
        })
        .unwrap();

    // Still listed, but it cannot be redeemed
    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    let orphan = listed
        .iter()
        .find(|record| record.outpoint() != minted.outpoint())
        .unwrap();
    assert!(matches!(
        manager.redeem(orphan).await,
        Err(CollectibleError::InvalidRecord(_))
    ));
}

#[tokio::test]
async fn test_field_limit_from_config() {
    let config = CollectiblesConfig::from_json_str(r#"{"max_field_len": 128}"#).unwrap();
    let ledger = Arc::new(CountingLedger::with_funds(100));
    let manager =
        TokenLifecycleManager::with_config(PushDropEngine::random(), ledger.clone(), config).unwrap();
    assert_eq!(manager.codec().max_field_len(), 128);

    // Fits the engine's default limit, but not the configured one
    let mut card = dragon();
    card.description = "A very old dragon. ".repeat(16);
    let err = manager.mint(&card).await.unwrap_err();
    assert!(matches!(err, CollectibleError::Encoding(_)));
    assert_eq!(ledger.calls(), 0);

    // The default limit fits the same card
    let (manager, _) = setup(100);
    manager.mint(&card).await.unwrap();
}

#[tokio::test]
async fn test_dragon_with_empty_history_lifecycle() {
    let (manager, _) = setup(100);
    let card = Card::new("Dragon", "Fire breather", Rarity::Rare, "Burn", 5);
    assert_eq!(card.history, "");

    let minted = manager.mint(&card).await.unwrap();
    assert_eq!(minted.value_units, 5);

    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].attributes, Some(card.attributes()));
    assert_eq!(listed[0].value_units, 5);
    assert_eq!(listed[0].metadata.history, "");

    manager.redeem(&listed[0]).await.unwrap();
    assert!(manager
        .list()
        .await
        .unwrap()
        .iter()
        .all(|record| record.outpoint() != minted.outpoint()));
}

#[tokio::test]
async fn test_redeem_uses_key_identifier_as_stored() {
    let (manager, ledger) = setup(100);
    let stored = KeyIdentifier::generate().to_string().to_uppercase();

    // Another producer locked the card under the uppercase identifier text
    let payload = serde_json::to_vec(&knight().attributes()).unwrap();
    let script = manager
        .codec()
        .service()
        .encode_fields(&[payload], PROTOCOL_NAMESPACE, &stored)
        .await
        .unwrap();
    let outpoint = ledger
        .inner
        .insert_output(OutputToCreate {
            value_units: 1,
            locking_script: script,
            basket: COLLECTION_BASKET.to_string(),
            metadata: Some(serde_json::json!({"keyID": stored, "history": ""})),
        })
        .unwrap();

    let listed = manager.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].metadata.key_id, stored);

    manager.redeem(&listed[0]).await.unwrap();
    assert!(ledger.inner.is_spent(&outpoint).unwrap());
}
