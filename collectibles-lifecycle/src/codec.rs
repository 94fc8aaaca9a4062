//! Card codec: maps card attributes to and from locking script fields.
//!
//! Field 0 is the JSON encoding of the four descriptive attributes. When key
//! embedding is enabled, field 1 carries the key identifier as text.

use collectibles_core::config::DEFAULT_MAX_FIELD_LEN;
use collectibles_core::error::{CollectibleError, Stage};
use collectibles_core::id::{KeyIdentifier, TransactionId};
use collectibles_core::objects::CardAttributes;
use collectibles_script::engine::ScriptService;

/// Attributes recovered from a locking script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCard {
    pub attributes: CardAttributes,

    /// Key identifier carried in the script itself, if it was embedded
    pub key_identifier: Option<KeyIdentifier>,
}

/// Stateless translator between card attributes and scripts
#[derive(Debug)]
pub struct CardCodec<S> {
    service: S,
    embed_key_id: bool,
    max_field_len: usize,
}

impl<S: ScriptService> CardCodec<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            embed_key_id: false,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }

    /// Also write the key identifier into encoded scripts
    pub fn embedding_key_id(mut self, embed: bool) -> Self {
        self.embed_key_id = embed;
        self
    }

    /// Refuse to encode any field longer than `max_field_len` bytes
    pub fn with_max_field_len(mut self, max_field_len: usize) -> Self {
        self.max_field_len = max_field_len;
        self
    }

    pub fn max_field_len(&self) -> usize {
        self.max_field_len
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Build a locking script carrying the attributes, bound to the key for
    /// `(namespace, key_id)`
    pub async fn encode(
        &self,
        attributes: &CardAttributes,
        namespace: &str,
        key_id: &KeyIdentifier,
    ) -> Result<Vec<u8>, CollectibleError> {
        if let Some(field) = attributes.first_blank_field() {
            return Err(CollectibleError::Encoding(format!("card {} is missing", field)));
        }

        let payload = serde_json::to_vec(attributes)
            .map_err(|err| CollectibleError::Encoding(format!("card payload: {}", err)))?;
        let key_text = key_id.to_string();

        let mut fields = vec![payload];
        if self.embed_key_id {
            fields.push(key_text.clone().into_bytes());
        }
        if let Some(field) = fields.iter().find(|field| field.len() > self.max_field_len) {
            return Err(CollectibleError::Encoding(format!(
                "card field is {} bytes, limit is {}",
                field.len(),
                self.max_field_len
            )));
        }

        self.service
            .encode_fields(&fields, namespace, &key_text)
            .await
            .map_err(|err| err.at(Stage::Encode))
    }

    /// Recover the attributes from a locking script
    pub async fn decode(&self, script: &[u8]) -> Result<CardAttributes, CollectibleError> {
        Ok(self.decode_card(script).await?.attributes)
    }

    /// Recover the attributes and any embedded key identifier
    pub async fn decode_card(&self, script: &[u8]) -> Result<DecodedCard, CollectibleError> {
        let fields = self
            .service
            .decode_fields(script)
            .await
            .map_err(|err| err.at(Stage::Decode))?;

        let (payload, key_field) = match fields.as_slice() {
            [payload] => (payload, None),
            [payload, key_field] => (payload, Some(key_field)),
            _ => {
                return Err(CollectibleError::Decoding(format!(
                    "expected 1 or 2 fields, found {}",
                    fields.len()
                )))
            }
        };

        let attributes: CardAttributes = serde_json::from_slice(payload)
            .map_err(|err| CollectibleError::Decoding(format!("card payload: {}", err)))?;
        if let Some(field) = attributes.first_blank_field() {
            return Err(CollectibleError::Decoding(format!(
                "card payload has an empty {}",
                field
            )));
        }

        let key_identifier = match key_field {
            Some(bytes) => Some(
                std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|text| KeyIdentifier::parse(text).ok())
                    .ok_or_else(|| {
                        CollectibleError::Decoding("embedded key identifier is malformed".to_string())
                    })?,
            ),
            None => None,
        };

        Ok(DecodedCard {
            attributes,
            key_identifier,
        })
    }

    /// Build the unlocking script for a previously encoded output.
    ///
    /// `key_id` is used exactly as it was recorded at mint time.
    pub async fn build_unlocking_proof(
        &self,
        namespace: &str,
        key_id: &str,
        prev_tx: &TransactionId,
        output_index: u32,
        locking_script: &[u8],
        value_units: u64,
    ) -> Result<Vec<u8>, CollectibleError> {
        self.service
            .build_unlock_proof(
                namespace,
                key_id,
                prev_tx,
                output_index,
                locking_script,
                value_units,
            )
            .await
            .map_err(|err| err.at(Stage::Redeem))
    }
}
