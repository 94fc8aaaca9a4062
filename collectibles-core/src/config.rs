use crate::error::CollectibleError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Protocol namespace every card key is derived under
pub const PROTOCOL_NAMESPACE: &str = "card collectibles";

/// Ledger collection minted cards are tracked in
pub const COLLECTION_BASKET: &str = "game_collectibles";

/// Largest single data push a locking script may carry
pub const DEFAULT_MAX_FIELD_LEN: usize = 520;

/// Room needed for the 64 byte signature field
const MIN_FIELD_LEN: usize = 64;

/// Settings for the token lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectiblesConfig {
    pub protocol_namespace: String,

    pub basket: String,

    pub max_field_len: usize,

    /// Also carry the key identifier inside the locking script, so a token
    /// stays redeemable if the ledger loses its out-of-band metadata
    pub embed_key_id: bool,
}

impl Default for CollectiblesConfig {
    fn default() -> Self {
        Self {
            protocol_namespace: PROTOCOL_NAMESPACE.to_string(),
            basket: COLLECTION_BASKET.to_string(),
            max_field_len: DEFAULT_MAX_FIELD_LEN,
            embed_key_id: false,
        }
    }
}

impl CollectiblesConfig {
    /// Parse a JSON document; missing keys take their default values
    pub fn from_json_str(json: &str) -> Result<Self, CollectibleError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| CollectibleError::Config(format!("invalid config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CollectibleError> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), CollectibleError> {
        if self.protocol_namespace.trim().is_empty() {
            return Err(CollectibleError::Config(
                "protocol_namespace must not be empty".to_string(),
            ));
        }
        if self.basket.trim().is_empty() {
            return Err(CollectibleError::Config("basket must not be empty".to_string()));
        }
        if self.max_field_len < MIN_FIELD_LEN {
            return Err(CollectibleError::Config(format!(
                "max_field_len must be at least {}",
                MIN_FIELD_LEN
            )));
        }
        Ok(())
    }
}
