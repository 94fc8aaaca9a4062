//! Per-card key derivation and Schnorr signatures over the Ed25519 group.
//!
//! A card key is the root secret offset by a hash of the protocol namespace
//! and the card's key identifier, so the same pair always yields the same key
//! and different identifiers yield unrelated keys.

use collectibles_core::error::ScriptError;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};
use std::fmt;

const DERIVE_DOMAIN: &[u8] = b"collectibles/derive";
const NONCE_DOMAIN: &[u8] = b"collectibles/nonce";
const CHALLENGE_DOMAIN: &[u8] = b"collectibles/challenge";

const MIN_NAMESPACE_LEN: usize = 5;
const MAX_NAMESPACE_LEN: usize = 400;
const MAX_KEY_ID_LEN: usize = 800;

/// Length of an encoded signature: compressed R followed by s
pub const SIGNATURE_LEN: usize = 64;

/// Check a protocol namespace can be used for derivation.
///
/// Namespaces are 5 to 400 characters of lowercase letters, digits and single
/// spaces, and must not end in " protocol".
pub fn validate_protocol_namespace(namespace: &str) -> Result<(), ScriptError> {
    let len = namespace.chars().count();
    if !(MIN_NAMESPACE_LEN..=MAX_NAMESPACE_LEN).contains(&len) {
        return Err(ScriptError::KeyDerivation(format!(
            "protocol namespace must be {} to {} characters, got {}",
            MIN_NAMESPACE_LEN, MAX_NAMESPACE_LEN, len
        )));
    }
    if !namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ')
    {
        return Err(ScriptError::KeyDerivation(format!(
            "protocol namespace '{}' may only contain lowercase letters, digits and spaces",
            namespace
        )));
    }
    if namespace.starts_with(' ') || namespace.ends_with(' ') || namespace.contains("  ") {
        return Err(ScriptError::KeyDerivation(format!(
            "protocol namespace '{}' has leading, trailing or repeated spaces",
            namespace
        )));
    }
    if namespace.ends_with(" protocol") {
        return Err(ScriptError::KeyDerivation(format!(
            "protocol namespace '{}' must not end with \" protocol\"",
            namespace
        )));
    }
    Ok(())
}

pub fn validate_key_id(key_id: &str) -> Result<(), ScriptError> {
    if key_id.is_empty() {
        return Err(ScriptError::KeyDerivation("key identifier is empty".to_string()));
    }
    if key_id.len() > MAX_KEY_ID_LEN {
        return Err(ScriptError::KeyDerivation(format!(
            "key identifier is {} bytes, limit is {}",
            key_id.len(),
            MAX_KEY_ID_LEN
        )));
    }
    Ok(())
}

/// Reduce a 64 byte hash of the given parts to a scalar
fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Holds the root secret and derives per-card keys from it
pub struct KeyDeriver {
    root: Scalar,
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("root_public", &hex::encode(EdwardsPoint::mul_base(&self.root).compress().as_bytes()))
            .finish()
    }
}

impl KeyDeriver {
    /// Create a deriver from 32 bytes of root secret material
    pub fn new(root_secret: [u8; 32]) -> Self {
        Self {
            root: Scalar::from_bytes_mod_order(root_secret),
        }
    }

    /// Create a deriver with a fresh root secret from the operating system
    pub fn random() -> Self {
        let mut wide = [0u8; 64];
        OsRng.fill_bytes(&mut wide);
        Self {
            root: Scalar::from_bytes_mod_order_wide(&wide),
        }
    }

    /// Derive the key for a (namespace, key identifier) pair
    pub fn derive(&self, namespace: &str, key_id: &str) -> Result<DerivedKey, ScriptError> {
        validate_protocol_namespace(namespace)?;
        validate_key_id(key_id)?;

        let offset = hash_to_scalar(&[
            DERIVE_DOMAIN,
            &(namespace.len() as u32).to_le_bytes(),
            namespace.as_bytes(),
            &(key_id.len() as u32).to_le_bytes(),
            key_id.as_bytes(),
        ]);
        let secret = self.root + offset;
        if secret == Scalar::ZERO {
            return Err(ScriptError::KeyDerivation(
                "derived key is degenerate".to_string(),
            ));
        }

        Ok(DerivedKey {
            secret,
            public: EdwardsPoint::mul_base(&secret),
        })
    }
}

/// A per-card signing key
pub struct DerivedKey {
    secret: Scalar,
    public: EdwardsPoint,
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("public", &hex::encode(self.public_key()))
            .finish()
    }
}

impl DerivedKey {
    /// Compressed Edwards encoding of the public key
    pub fn public_key(&self) -> [u8; 32] {
        self.public.compress().to_bytes()
    }

    /// Schnorr signature with a nonce derived from the secret and the message
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let nonce = hash_to_scalar(&[NONCE_DOMAIN, self.secret.as_bytes(), message]);
        let r = EdwardsPoint::mul_base(&nonce).compress();
        let challenge = hash_to_scalar(&[
            CHALLENGE_DOMAIN,
            r.as_bytes(),
            self.public.compress().as_bytes(),
            message,
        ]);
        let s = nonce + challenge * self.secret;

        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..32].copy_from_slice(r.as_bytes());
        signature[32..].copy_from_slice(s.as_bytes());
        signature
    }
}

/// Verify a signature produced by `DerivedKey::sign`
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
    if signature.len() != SIGNATURE_LEN {
        return false;
    }

    let Some(public) = CompressedEdwardsY(*public_key).decompress() else {
        return false;
    };
    if public.is_small_order() {
        return false;
    }

    let mut r_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&signature[..32]);
    let Some(r) = CompressedEdwardsY(r_bytes).decompress() else {
        return false;
    };

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature[32..]);
    let Some(s) = Option::<Scalar>::from(Scalar::from_canonical_bytes(s_bytes)) else {
        return false;
    };

    let challenge = hash_to_scalar(&[CHALLENGE_DOMAIN, &r_bytes, public_key, message]);
    EdwardsPoint::mul_base(&s) == r + public * challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMESPACE: &str = "card collectibles";

    fn deriver() -> KeyDeriver {
        KeyDeriver::new([42u8; 32])
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = deriver().derive(NAMESPACE, "card-1").unwrap();
        let b = deriver().derive(NAMESPACE, "card-1").unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_different_inputs_give_different_keys() {
        let base = deriver().derive(NAMESPACE, "card-1").unwrap();

        let other_id = deriver().derive(NAMESPACE, "card-2").unwrap();
        assert_ne!(base.public_key(), other_id.public_key());

        let other_namespace = deriver().derive("trading cards", "card-1").unwrap();
        assert_ne!(base.public_key(), other_namespace.public_key());

        let other_root = KeyDeriver::new([7u8; 32]).derive(NAMESPACE, "card-1").unwrap();
        assert_ne!(base.public_key(), other_root.public_key());
    }

    #[test]
    fn test_random_roots_differ() {
        let a = KeyDeriver::random().derive(NAMESPACE, "card-1").unwrap();
        let b = KeyDeriver::random().derive(NAMESPACE, "card-1").unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_namespace_rules() {
        assert!(validate_protocol_namespace("card collectibles").is_ok());
        assert!(validate_protocol_namespace("cards 2").is_ok());

        for bad in [
            "",
            "card",
            "Card Collectibles",
            "card_collectibles",
            "card  collectibles",
            " card collectibles",
            "card collectibles ",
            "card collectibles protocol",
        ] {
            assert!(
                matches!(validate_protocol_namespace(bad), Err(ScriptError::KeyDerivation(_))),
                "namespace {:?} should be rejected",
                bad
            );
        }

        assert!(validate_protocol_namespace(&"a".repeat(401)).is_err());
    }

    #[test]
    fn test_key_id_rules() {
        assert!(validate_key_id("x").is_ok());
        assert!(validate_key_id("").is_err());
        assert!(validate_key_id(&"k".repeat(801)).is_err());

        let err = deriver().derive(NAMESPACE, "").unwrap_err();
        assert!(matches!(err, ScriptError::KeyDerivation(_)));
    }

    #[test]
    fn test_sign_and_verify() {
        let key = deriver().derive(NAMESPACE, "card-1").unwrap();
        let signature = key.sign(b"hello");

        assert!(verify_signature(&key.public_key(), b"hello", &signature));
        assert!(!verify_signature(&key.public_key(), b"hellp", &signature));
        assert!(!verify_signature(&key.public_key(), b"hello", &signature[..63]));

        let other = deriver().derive(NAMESPACE, "card-2").unwrap();
        assert!(!verify_signature(&other.public_key(), b"hello", &signature));
    }

    #[test]
    fn test_tampered_signature_fails() {
        let key = deriver().derive(NAMESPACE, "card-1").unwrap();
        let mut signature = key.sign(b"hello");
        signature[40] ^= 0x01;
        assert!(!verify_signature(&key.public_key(), b"hello", &signature));
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = deriver().derive(NAMESPACE, "card-1").unwrap();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains(&hex::encode(key.public_key())));
        assert!(!rendered.contains("secret"));
    }
}
