use crate::error::CollectibleError;
use crate::id::{KeyIdentifier, TransactionId};
use crate::transaction::OutPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How scarce a card is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 4] = [Rarity::Common, Rarity::Rare, Rarity::Epic, Rarity::Legendary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rarity {
    type Err = CollectibleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Rarity::ALL
            .into_iter()
            .find(|rarity| rarity.as_str() == wanted)
            .ok_or_else(|| {
                CollectibleError::Validation(format!(
                    "unknown rarity '{}', expected one of common, rare, epic, legendary",
                    s
                ))
            })
    }
}

/// The descriptive attributes carried inside a card's locking script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAttributes {
    pub name: String,
    pub description: String,
    pub rarity: Rarity,
    pub ability: String,
}

impl CardAttributes {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        rarity: Rarity,
        ability: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            rarity,
            ability: ability.into(),
        }
    }

    /// Name of the first text field that is blank, if any
    pub fn first_blank_field(&self) -> Option<&'static str> {
        [
            ("name", &self.name),
            ("description", &self.description),
            ("ability", &self.ability),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

/// A card as entered by a user, before it is minted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub name: String,
    pub description: String,
    pub rarity: Rarity,
    pub ability: String,
    /// Provenance note kept next to the output, not in the script
    #[serde(default)]
    pub history: String,
    /// Value carried by the underlying output
    pub value_units: u64,
}

impl Card {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        rarity: Rarity,
        ability: impl Into<String>,
        value_units: u64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            rarity,
            ability: ability.into(),
            history: String::new(),
            value_units,
        }
    }

    pub fn with_history(mut self, history: impl Into<String>) -> Self {
        self.history = history.into();
        self
    }

    /// Check the card can be minted: every attribute filled in and a positive value.
    ///
    /// `history` is optional and may be empty.
    pub fn validate(&self) -> Result<(), CollectibleError> {
        if let Some(field) = self.attributes().first_blank_field() {
            return Err(CollectibleError::Validation(format!(
                "card {} must not be empty",
                field
            )));
        }

        if self.value_units == 0 {
            return Err(CollectibleError::Validation(
                "card value must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn attributes(&self) -> CardAttributes {
        CardAttributes::new(
            self.name.clone(),
            self.description.clone(),
            self.rarity,
            self.ability.clone(),
        )
    }
}

/// Data kept next to a token's output rather than inside its locking script.
///
/// Field names match the custom instructions format used on the ledger side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedMetadata {
    #[serde(rename = "keyID", default)]
    pub key_id: String,

    #[serde(default)]
    pub history: String,
}

impl AssociatedMetadata {
    pub fn new(key_id: &KeyIdentifier, history: impl Into<String>) -> Self {
        Self {
            key_id: key_id.to_string(),
            history: history.into(),
        }
    }

    /// The key identifier recorded at mint time
    pub fn key_identifier(&self) -> Result<KeyIdentifier, CollectibleError> {
        if self.key_id.trim().is_empty() {
            return Err(CollectibleError::InvalidRecord(
                "token record has no key identifier".to_string(),
            ));
        }
        KeyIdentifier::parse(&self.key_id).map_err(|err| {
            CollectibleError::InvalidRecord(format!(
                "token record key identifier '{}' is malformed: {}",
                self.key_id, err
            ))
        })
    }

    pub fn to_value(&self) -> Result<serde_json::Value, CollectibleError> {
        serde_json::to_value(self)
            .map_err(|err| CollectibleError::Encoding(format!("metadata: {}", err)))
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

/// Where a card is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenState {
    /// Entered but not yet on the ledger
    Draft,
    /// Recorded as a spendable output
    Minted,
    /// Spent; the output can never be spent again
    Redeemed,
}

impl Default for TokenState {
    fn default() -> Self {
        TokenState::Draft
    }
}

impl TokenState {
    /// Only Draft -> Minted and Minted -> Redeemed are allowed
    pub fn can_transition_to(&self, next: TokenState) -> bool {
        matches!(
            (self, next),
            (TokenState::Draft, TokenState::Minted) | (TokenState::Minted, TokenState::Redeemed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == TokenState::Redeemed
    }
}

/// A minted card as it exists on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Transaction that created the output
    pub transaction_id: TransactionId,

    /// Position of the output within that transaction
    pub output_index: u32,

    /// Script produced by the card codec; opaque to the ledger
    pub locking_script: Vec<u8>,

    pub value_units: u64,

    /// Key identifier and history stored alongside the output
    pub metadata: AssociatedMetadata,

    /// Decoded card attributes, when known
    pub attributes: Option<CardAttributes>,

    pub state: TokenState,
}

impl TokenRecord {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.transaction_id, self.output_index)
    }

    /// Label used in memos and logs
    pub fn display_name(&self) -> String {
        match &self.attributes {
            Some(attributes) => attributes.name.clone(),
            None => self.outpoint().to_string(),
        }
    }
}

/// Confirmation that a token was spent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionReceipt {
    /// The spending transaction
    pub transaction_id: TransactionId,

    /// The redeemed record, now in the Redeemed state
    pub record: TokenRecord,

    pub redeemed_at: DateTime<Utc>,
}
