use std::fmt;
use thiserror::Error;

/// The stage of the token lifecycle at which an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Card or configuration validation, before any external call
    Validate,
    /// Building a locking script from card attributes
    Encode,
    /// Submitting a mint transaction to the ledger
    Submit,
    /// Querying the ledger for spendable outputs
    Query,
    /// Parsing a locking script back into card attributes
    Decode,
    /// Building or submitting a spending transaction
    Redeem,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Encode => "encode",
            Stage::Submit => "submit",
            Stage::Query => "query",
            Stage::Decode => "decode",
            Stage::Redeem => "redeem",
        };
        f.write_str(name)
    }
}

/// Errors raised by a script service while building or parsing scripts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Fields are missing or exceed the limits of the scripting primitive
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The script is malformed or was not produced by this protocol
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// The namespace/key identifier pair cannot be turned into a key
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),
}

impl ScriptError {
    /// Lift a script error into the lifecycle taxonomy, tagging where it happened
    pub fn at(self, stage: Stage) -> CollectibleError {
        match self {
            ScriptError::Encoding(msg) => CollectibleError::Encoding(msg),
            ScriptError::Decoding(msg) => CollectibleError::Decoding(msg),
            ScriptError::KeyDerivation(message) => CollectibleError::KeyDerivation { stage, message },
        }
    }
}

/// Errors raised by a ledger service when it cannot process a request at all.
///
/// A transaction the ledger evaluated and refused is not an error; it is
/// reported through `SubmitOutcome::accepted`.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger could not be reached or refused to serve the request
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors that don't fit in other categories
    #[error("Other error: {0}")]
    Other(String),
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

/// Represents all possible errors surfaced by the token lifecycle
#[derive(Error, Debug)]
pub enum CollectibleError {
    /// Card fields are incomplete or out of range
    #[error("Validation error: {0}")]
    Validation(String),

    /// Card attributes could not be packed into a locking script
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A locking script could not be turned back into card attributes
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// The protocol namespace and key identifier do not yield a usable key
    #[error("Key derivation error during {stage}: {message}")]
    KeyDerivation { stage: Stage, message: String },

    /// The token record handed to redeem is missing required details
    #[error("Invalid token record: {0}")]
    InvalidRecord(String),

    /// The ledger did not create the minted output
    #[error("Mint submission failed: {0}")]
    MintSubmission(String),

    /// The ledger could not be queried for spendable outputs
    #[error("Ledger query failed: {0}")]
    LedgerQuery(String),

    /// The ledger did not accept the spending transaction.
    ///
    /// `outcome_known` is true when the ledger explicitly rejected the spend,
    /// false when the request failed in transit and may or may not have landed.
    #[error("Redemption failed: {reason}")]
    Redemption { reason: String, outcome_known: bool },

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl CollectibleError {
    /// The lifecycle stage that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            CollectibleError::Validation(_)
            | CollectibleError::Config(_)
            | CollectibleError::Context(_) => Stage::Validate,
            CollectibleError::Encoding(_) => Stage::Encode,
            CollectibleError::Decoding(_) => Stage::Decode,
            CollectibleError::KeyDerivation { stage, .. } => *stage,
            CollectibleError::InvalidRecord(_) | CollectibleError::Redemption { .. } => Stage::Redeem,
            CollectibleError::MintSubmission(_) => Stage::Submit,
            CollectibleError::LedgerQuery(_) => Stage::Query,
        }
    }

    /// Whether repeating the failed operation cannot double-apply it on the ledger.
    ///
    /// Mint retries always create a new, distinct token. A redemption is only
    /// safe to repeat when the ledger reported that the previous spend did not land.
    pub fn is_retry_safe(&self) -> bool {
        match self {
            CollectibleError::Redemption { outcome_known, .. } => *outcome_known,
            CollectibleError::Context(_) => false,
            _ => true,
        }
    }

    pub fn redemption_rejected(reason: impl Into<String>) -> Self {
        CollectibleError::Redemption {
            reason: reason.into(),
            outcome_known: true,
        }
    }
}
