//! secp256k1 keys and signature canonicalization.
//!
//! [`KeyPair`] holds software key material. The free functions turn a
//! device answer, either ASN.1 DER (Cosmos app) or raw `r || s || v`
//! (Ethereum app), into the one canonical form every signer emits: low-S,
//! with the recovery id recomputed against the expected public key.
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::crypto::{KeyPair, verify_signature};
//! use alloy_primitives::keccak256;
//!
//! let key = KeyPair::generate();
//! let digest = keccak256(b"hello");
//! let sig = key.sign_digest(&digest).unwrap();
//! assert!(verify_signature(&digest, &sig, key.public_key()));
//! ```

use core::fmt;
use std::hash::{Hash, Hasher};

use alloy_primitives::B256;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::signature::Signature;

/// A secp256k1 public key.
///
/// The canonical byte form is the 33-byte SEC1 compressed point.
#[derive(Clone)]
pub struct PublicKey {
    compressed: [u8; Self::COMPRESSED_LEN],
    key: VerifyingKey,
}

impl PublicKey {
    /// Length of the compressed SEC1 encoding.
    pub const COMPRESSED_LEN: usize = 33;

    /// Length of the uncompressed SEC1 encoding.
    pub const UNCOMPRESSED_LEN: usize = 65;

    /// Parses a public key from SEC1 bytes (33-byte compressed or 65-byte
    /// uncompressed).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if the bytes are not a valid point.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::COMPRESSED_LEN && bytes.len() != Self::UNCOMPRESSED_LEN {
            return Err(Error::InvalidPublicKey(format!(
                "expected 33 or 65 bytes, got {}",
                bytes.len()
            )));
        }
        let key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        Ok(Self::from_verifying_key(key))
    }

    /// Parses a public key from hex, optionally prefixed with `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] or [`Error::InvalidPublicKey`].
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        Self::from_sec1_bytes(&hex::decode(hex_str)?)
    }

    /// Wraps a [`VerifyingKey`].
    #[must_use]
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        let mut compressed = [0u8; Self::COMPRESSED_LEN];
        compressed.copy_from_slice(key.to_encoded_point(true).as_bytes());
        Self { compressed, key }
    }

    /// Returns the compressed SEC1 encoding.
    #[must_use]
    pub const fn to_compressed(&self) -> [u8; Self::COMPRESSED_LEN] {
        self.compressed
    }

    /// Returns the compressed SEC1 encoding as a slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.compressed
    }

    /// Returns the uncompressed SEC1 encoding (`0x04 || x || y`).
    #[must_use]
    pub fn to_uncompressed(&self) -> [u8; Self::UNCOMPRESSED_LEN] {
        let mut out = [0u8; Self::UNCOMPRESSED_LEN];
        out.copy_from_slice(self.key.to_encoded_point(false).as_bytes());
        out
    }

    /// Returns the underlying [`VerifyingKey`].
    #[must_use]
    pub const fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// Lowercase hex of the compressed encoding, without prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.compressed)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.compressed == other.compressed
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.compressed.hash(state);
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A software-held secp256k1 key pair.
///
/// The secret scalar is owned exclusively and zeroed on drop by
/// [`SigningKey`]. [`fmt::Debug`] never prints it.
pub struct KeyPair {
    secret: SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh key pair from the operating system RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Builds a key pair from a 32-byte big-endian secret scalar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSecretKey`] if the scalar is zero or not
    /// below the curve order.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SigningKey::from_slice(bytes).map_err(|_| Error::InvalidSecretKey)?;
        Ok(Self::from_signing_key(secret))
    }

    fn from_signing_key(secret: SigningKey) -> Self {
        let public = PublicKey::from_verifying_key(secret.verifying_key().clone());
        Self { secret, public }
    }

    /// Returns the public half.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Returns the secret scalar in a buffer that is zeroed on drop.
    #[must_use]
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&self.secret.to_bytes());
        out
    }

    /// Signs a 32-byte digest, returning a low-S recoverable signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if the underlying signer fails.
    pub fn sign_digest(&self, digest: &B256) -> Result<Signature> {
        let (sig, recovery_id) = self
            .secret
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;

        let (r, s, flipped) = low_s_scalars(&sig);
        let v = recovery_id.to_byte() ^ u8::from(flipped);
        Ok(Signature::new(r, s, v))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// How a device encodes the signatures it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureEncoding {
    /// 65 raw bytes `r || s || v`.
    Raw,
    /// ASN.1 DER `SEQUENCE { r INTEGER, s INTEGER }`.
    Der,
}

/// Decodes a DER `SEQUENCE { r INTEGER, s INTEGER }` into 32-byte scalars.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] if the encoding is malformed or a
/// scalar is zero or out of range.
pub fn parse_der_signature(der: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    let sig = K256Signature::from_der(der)
        .map_err(|e| Error::InvalidSignature(format!("bad DER signature: {e}")))?;
    let (r, s) = sig.split_bytes();
    Ok((r.into(), s.into()))
}

/// Returns `(r, s, flipped)` with `s` in the lower half of the group order.
/// `flipped` means `s` was negated, which flips the recovery id parity.
fn low_s_scalars(sig: &K256Signature) -> ([u8; 32], [u8; 32], bool) {
    let (sig, flipped) = match sig.normalize_s() {
        Some(normalized) => (normalized, true),
        None => (*sig, false),
    };
    let (r, s) = sig.split_bytes();
    (r.into(), s.into(), flipped)
}

fn to_k256(r: &[u8; 32], s: &[u8; 32]) -> Result<K256Signature> {
    K256Signature::from_scalars(*r, *s)
        .map_err(|_| Error::InvalidSignature("r or s is not a valid scalar".to_string()))
}

/// Recovers the public key that produced `signature` over `digest`.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] if the scalars or recovery id are
/// invalid or no key can be recovered.
pub fn recover_public_key(digest: &B256, signature: &Signature) -> Result<PublicKey> {
    let sig = to_k256(signature.r(), signature.s())?;
    let recovery_id = RecoveryId::from_byte(signature.v())
        .ok_or_else(|| Error::InvalidSignature(format!("invalid recovery id {}", signature.v())))?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)
        .map_err(|e| Error::InvalidSignature(e.to_string()))?;
    Ok(PublicKey::from_verifying_key(key))
}

/// Finds the recovery id under which `(r, s)` recovers to `public_key`.
///
/// # Errors
///
/// Returns [`Error::SigningError`] if neither recovery id yields
/// `public_key`.
pub fn calculate_recovery_parameter(
    digest: &B256,
    r: &[u8; 32],
    s: &[u8; 32],
    public_key: &PublicKey,
) -> Result<u8> {
    for recovery_id in 0u8..2u8 {
        let candidate = Signature::new(*r, *s, recovery_id);
        if let Ok(recovered) = recover_public_key(digest, &candidate)
            && &recovered == public_key
        {
            return Ok(recovery_id);
        }
    }

    Err(Error::SigningError(
        "signature does not recover to the expected public key".to_string(),
    ))
}

/// Canonicalizes a device answer for `digest` signed by `public_key`.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] for malformed responses and
/// [`Error::SigningError`] if the signature was not made by `public_key`
/// over `digest`.
pub fn signature_from_device(
    response: &[u8],
    encoding: SignatureEncoding,
    digest: &B256,
    public_key: &PublicKey,
) -> Result<Signature> {
    let sig = match encoding {
        SignatureEncoding::Der => K256Signature::from_der(response)
            .map_err(|e| Error::InvalidSignature(format!("bad DER signature: {e}")))?,
        SignatureEncoding::Raw => {
            let raw = Signature::from_bytes(response)?;
            to_k256(raw.r(), raw.s())?
        }
    };

    let (r, s, _) = low_s_scalars(&sig);
    let v = calculate_recovery_parameter(digest, &r, &s, public_key)?;
    Ok(Signature::new(r, s, v))
}

/// Verifies a signature over a 32-byte digest.
#[must_use]
pub fn verify_signature(digest: &B256, signature: &Signature, public_key: &PublicKey) -> bool {
    match to_k256(signature.r(), signature.s()) {
        Ok(sig) => public_key
            .verifying_key()
            .verify_prehash(digest.as_slice(), &sig)
            .is_ok(),
        Err(_) => false,
    }
}
