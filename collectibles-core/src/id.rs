use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use uuid::Uuid;

// KeyIdentifier names the per-card key derivation used to lock and unlock a token.
// It is a random 128-bit value, never a counter, so it reveals nothing about the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyIdentifier(Uuid);

impl KeyIdentifier {
    /// Generate a fresh identifier from the operating system's secure random source
    pub fn generate() -> Self {
        KeyIdentifier(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        KeyIdentifier(uuid)
    }

    /// Parse an identifier from its textual form (hyphenated or simple)
    pub fn parse(text: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(text.trim()).map(KeyIdentifier)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Get the raw 16 bytes of the identifier
    pub fn bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for KeyIdentifier {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyIdentifier::parse(s)
    }
}

// TransactionId is the 32 byte hash a ledger assigns to a submitted transaction.
// The all-zero value stands for "no transaction".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId([u8; 32]);

impl Default for TransactionId {
    fn default() -> Self {
        TransactionId([0; 32])
    }
}

impl Deref for TransactionId {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TransactionId {
    pub fn new(hash: [u8; 32]) -> Self {
        TransactionId(hash)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check whether this is the empty (all-zero) id
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 32]
    }

    /// Full lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex string
    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(text.trim(), &mut bytes)?;
        Ok(TransactionId(bytes))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for TransactionId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionId::from_hex(s)
    }
}
