//! Push-drop script template.
//!
//! Locking script layout:
//!
//! ```text
//! <0xed ‖ card public key> OP_CHECKSIG <field_0> ... <field_n> <signature> OP_2DROP... [OP_DROP]
//! ```
//!
//! The data pushes are dropped before `OP_CHECKSIG` runs, so spending only
//! requires a signature from the card key. The final push is the card key's
//! signature over the fields, which lets decoding tell our scripts apart
//! from look-alikes.

use crate::engine::{ScriptService, UnlockVerifier, VerificationResult};
use crate::keys::{verify_signature, KeyDeriver, SIGNATURE_LEN};
use crate::script::{parse_chunks, ScriptBuilder, ScriptChunk, OP_CHECKSIG};
use async_trait::async_trait;
use collectibles_core::config::DEFAULT_MAX_FIELD_LEN;
use collectibles_core::error::ScriptError;
use collectibles_core::id::TransactionId;
use log::debug;
use sha2::{Digest, Sha256};

/// Marks the key push as an Ed25519 point
const KEY_TAG: u8 = 0xed;
const KEY_PUSH_LEN: usize = 33;

const FIELDS_DOMAIN: &[u8] = b"collectibles/fields";
const SPEND_DOMAIN: &[u8] = b"collectibles/spend";

/// A parsed push-drop locking script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushDropScript {
    /// Compressed public key the output is locked to
    pub locking_key: [u8; 32],

    /// Data fields, without the trailing signature
    pub fields: Vec<Vec<u8>>,

    /// Signature over the fields by the locking key
    pub signature: Vec<u8>,
}

impl PushDropScript {
    /// Parse a script, checking the layout but not the field signature
    pub fn parse(script: &[u8]) -> Result<Self, ScriptError> {
        let mut chunks = parse_chunks(script)?.into_iter();

        let locking_key = match chunks.next() {
            Some(ScriptChunk::Push(key)) if key.len() == KEY_PUSH_LEN && key[0] == KEY_TAG => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&key[1..]);
                bytes
            }
            _ => {
                return Err(ScriptError::Decoding(
                    "script does not start with a locking key".to_string(),
                ))
            }
        };

        if chunks.next() != Some(ScriptChunk::Op(OP_CHECKSIG)) {
            return Err(ScriptError::Decoding(
                "locking key is not followed by OP_CHECKSIG".to_string(),
            ));
        }

        let mut pushes = Vec::new();
        let mut trailer = Vec::new();
        for chunk in chunks {
            match chunk {
                ScriptChunk::Push(data) if trailer.is_empty() => pushes.push(data),
                ScriptChunk::Push(_) => {
                    return Err(ScriptError::Decoding(
                        "data push after drop opcodes".to_string(),
                    ))
                }
                ScriptChunk::Op(opcode) => trailer.push(opcode),
            }
        }

        if pushes.len() < 2 {
            return Err(ScriptError::Decoding(
                "script carries no fields".to_string(),
            ));
        }
        if trailer != ScriptBuilder::new().drops(pushes.len()).into_bytes() {
            return Err(ScriptError::Decoding(
                "drop opcodes do not match the number of fields".to_string(),
            ));
        }

        let Some(signature) = pushes.pop() else {
            return Err(ScriptError::Decoding("missing field signature".to_string()));
        };

        Ok(Self {
            locking_key,
            fields: pushes,
            signature,
        })
    }

    /// Whether the field signature was made by the locking key
    pub fn has_valid_signature(&self) -> bool {
        verify_signature(&self.locking_key, &fields_digest(&self.fields), &self.signature)
    }
}

/// Digest the fields are signed over
pub fn fields_digest(fields: &[Vec<u8>]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(FIELDS_DOMAIN);
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field);
    }
    hasher.finalize().into()
}

/// Digest an unlocking signature commits to
pub fn spend_digest(
    prev_tx: &TransactionId,
    output_index: u32,
    locking_script: &[u8],
    value_units: u64,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(SPEND_DOMAIN);
    hasher.update(prev_tx.bytes());
    hasher.update(output_index.to_le_bytes());
    hasher.update((locking_script.len() as u64).to_le_bytes());
    hasher.update(locking_script);
    hasher.update(value_units.to_le_bytes());
    hasher.finalize().into()
}

/// Script service implementing the push-drop template
#[derive(Debug)]
pub struct PushDropEngine {
    deriver: KeyDeriver,
    max_field_len: usize,
}

impl PushDropEngine {
    /// Create an engine deriving card keys from the given root
    pub fn new(deriver: KeyDeriver) -> Self {
        Self {
            deriver,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }

    /// Create an engine with a fresh random root secret
    pub fn random() -> Self {
        Self::new(KeyDeriver::random())
    }

    pub fn with_max_field_len(mut self, max_field_len: usize) -> Self {
        self.max_field_len = max_field_len;
        self
    }

    pub fn max_field_len(&self) -> usize {
        self.max_field_len
    }

    /// A verifier ledgers can use to check spends of this engine's outputs
    pub fn verifier(&self) -> PushDropVerifier {
        PushDropVerifier
    }

    fn lock(&self, fields: &[Vec<u8>], namespace: &str, key_id: &str) -> Result<Vec<u8>, ScriptError> {
        if fields.is_empty() {
            return Err(ScriptError::Encoding("at least one field is required".to_string()));
        }
        for (index, field) in fields.iter().enumerate() {
            if field.len() > self.max_field_len {
                return Err(ScriptError::Encoding(format!(
                    "field {} is {} bytes, limit is {}",
                    index,
                    field.len(),
                    self.max_field_len
                )));
            }
        }

        let key = self.deriver.derive(namespace, key_id)?;
        let signature = key.sign(&fields_digest(fields));

        let mut tagged_key = Vec::with_capacity(KEY_PUSH_LEN);
        tagged_key.push(KEY_TAG);
        tagged_key.extend_from_slice(&key.public_key());

        let mut builder = ScriptBuilder::new().push(&tagged_key)?.op(OP_CHECKSIG);
        for field in fields {
            builder = builder.push(field)?;
        }
        let script = builder.push(&signature)?.drops(fields.len() + 1).into_bytes();

        debug!(
            "Built push-drop script with {} fields ({} bytes)",
            fields.len(),
            script.len()
        );
        Ok(script)
    }
}

#[async_trait]
impl ScriptService for PushDropEngine {
    async fn encode_fields(
        &self,
        fields: &[Vec<u8>],
        namespace: &str,
        key_id: &str,
    ) -> Result<Vec<u8>, ScriptError> {
        self.lock(fields, namespace, key_id)
    }

    async fn decode_fields(&self, script: &[u8]) -> Result<Vec<Vec<u8>>, ScriptError> {
        let parsed = PushDropScript::parse(script)?;
        if !parsed.has_valid_signature() {
            return Err(ScriptError::Decoding(
                "field signature does not match the locking key".to_string(),
            ));
        }
        Ok(parsed.fields)
    }

    async fn build_unlock_proof(
        &self,
        namespace: &str,
        key_id: &str,
        prev_tx: &TransactionId,
        output_index: u32,
        locking_script: &[u8],
        value_units: u64,
    ) -> Result<Vec<u8>, ScriptError> {
        let key = self.deriver.derive(namespace, key_id)?;
        let digest = spend_digest(prev_tx, output_index, locking_script, value_units);
        let signature = key.sign(&digest);
        Ok(ScriptBuilder::new().push(&signature)?.into_bytes())
    }
}

/// Verifies spends of push-drop outputs
#[derive(Debug, Clone, Copy, Default)]
pub struct PushDropVerifier;

impl UnlockVerifier for PushDropVerifier {
    fn verify_unlock(
        &self,
        locking_script: &[u8],
        unlocking_script: &[u8],
        prev_tx: &TransactionId,
        output_index: u32,
        value_units: u64,
    ) -> VerificationResult {
        let locking = match PushDropScript::parse(locking_script) {
            Ok(parsed) => parsed,
            Err(err) => return VerificationResult::Invalid(format!("locking script: {}", err)),
        };

        let signature = match parse_chunks(unlocking_script) {
            Ok(chunks) => match chunks.as_slice() {
                [ScriptChunk::Push(signature)] if signature.len() == SIGNATURE_LEN => signature.clone(),
                _ => {
                    return VerificationResult::Invalid(
                        "unlocking script must be a single signature push".to_string(),
                    )
                }
            },
            Err(err) => return VerificationResult::Invalid(format!("unlocking script: {}", err)),
        };

        let digest = spend_digest(prev_tx, output_index, locking_script, value_units);
        if verify_signature(&locking.locking_key, &digest, &signature) {
            VerificationResult::Valid
        } else {
            VerificationResult::Invalid("signature does not match the locking key".to_string())
        }
    }
}
