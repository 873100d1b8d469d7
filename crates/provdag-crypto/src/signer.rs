use provdag_types::{Digest, TypeError, ValidatorKey};
use serde::{Deserialize, Serialize};

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// Ed25519 signature over a block digest.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "signature_serde")] ed25519_dalek::Signature);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from a raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// Parse a hex-encoded 32-byte secret.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s.trim()).map_err(|_| SignatureError::InvalidKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self::from_bytes(arr))
    }

    /// The corresponding public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// The validator identity for this key.
    pub fn validator_key(&self) -> ValidatorKey {
        self.verifying_key().to_validator_key()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(message))
    }

    /// Sign a digest.
    pub fn sign_digest(&self, digest: &Digest) -> Signature {
        self.sign(digest.as_bytes())
    }

    /// Raw secret key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Hex-encoded secret, for key files.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }
}

impl VerifyingKey {
    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        self.0
            .verify(message, &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }

    /// The raw bytes as a block validator identity.
    pub fn to_validator_key(&self) -> ValidatorKey {
        ValidatorKey::from_bytes(self.0.to_bytes())
    }

    /// Parse a validator identity back into a curve point.
    pub fn from_validator_key(key: &ValidatorKey) -> Result<Self, SignatureError> {
        Self::from_bytes(*key.as_bytes())
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Create from a raw 32-byte public key.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(key))
    }
}

impl Signature {
    /// Raw 64 signature bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    /// Wrap raw signature bytes. Validity is only established by verification.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(&bytes))
    }

    /// Parse a hex-encoded 64-byte signature.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 64,
                actual: bytes.len(),
            })?;
        Ok(Self::from_bytes(arr))
    }
}

/// Verify `signature` over `digest` by `validator`.
///
/// Fails closed: a malformed validator key is reported as `false`, never as
/// an error the caller could mistake for "not checked".
pub fn verify_digest(digest: &Digest, signature: &Signature, validator: &ValidatorKey) -> bool {
    if digest.is_zero() || validator.is_empty() {
        return false;
    }
    match VerifyingKey::from_validator_key(validator) {
        Ok(key) => key.verify(digest.as_bytes(), signature).is_ok(),
        Err(_) => false,
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(self.0.to_bytes()))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0.to_bytes()[..8]))
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
}

mod signature_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(sig: &ed25519_dalek::Signature, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&sig.to_bytes())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ed25519_dalek::Signature, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64-byte signature"))?;
        Ok(ed25519_dalek::Signature::from_bytes(&arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer(seed: u8) -> SigningKey {
        SigningKey::from_bytes([seed; 32])
    }

    #[test]
    fn block_digest_signature_checks_out() {
        let key = producer(1);
        let block = Digest::of(b"block");
        let sig = key.sign_digest(&block);
        assert!(verify_digest(&block, &sig, &key.validator_key()));
        assert!(!verify_digest(&Digest::of(b"other block"), &sig, &key.validator_key()));
    }

    #[test]
    fn another_producer_cannot_claim_the_signature() {
        let block = Digest::of(b"block");
        let sig = producer(1).sign_digest(&block);
        assert!(!verify_digest(&block, &sig, &producer(2).validator_key()));
    }

    #[test]
    fn zero_digest_and_empty_validator_never_verify() {
        let key = producer(3);
        let sig = key.sign_digest(&Digest::zero());
        assert!(!verify_digest(&Digest::zero(), &sig, &key.validator_key()));

        let block = Digest::of(b"x");
        let sig = key.sign_digest(&block);
        assert!(!verify_digest(&block, &sig, &ValidatorKey::empty()));
    }

    #[test]
    fn key_file_hex_restores_the_same_validator() {
        let key = SigningKey::generate();
        let restored = SigningKey::from_hex(&format!("{}\n", key.to_hex())).unwrap();
        assert_eq!(restored.validator_key(), key.validator_key());
        assert_eq!(SigningKey::from_hex("not hex").unwrap_err(), SignatureError::InvalidKey);
    }

    #[test]
    fn validator_key_converts_back_to_verifying_key() {
        let key = producer(4);
        let vk = VerifyingKey::from_validator_key(&key.validator_key()).unwrap();
        assert_eq!(vk, key.verifying_key());
        assert_eq!(vk.to_validator_key(), key.validator_key());
    }

    #[test]
    fn signature_survives_json_and_hex() {
        let sig = producer(5).sign_digest(&Digest::of(b"block"));
        let parsed: Signature = serde_json::from_str(&serde_json::to_string(&sig).unwrap()).unwrap();
        assert_eq!(parsed, sig);
        assert_eq!(Signature::from_hex(&hex::encode(sig.to_bytes())).unwrap(), sig);
        assert!(Signature::from_hex("abcd").is_err());
    }

    #[test]
    fn signing_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", producer(6)), "SigningKey(<redacted>)");
    }
}
