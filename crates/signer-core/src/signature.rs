//! Recoverable secp256k1 signatures.
//!
//! A [`Signature`] is `r || s || v` with `s` in the lower half of the curve
//! order and `v` in `{0, 1}`. Over serde and [`Display`](fmt::Display) it is a
//! single `0x`-prefixed 65-byte hex string. [`SignerSignature`] pairs it with
//! the public key that produced it, as carried by a signed transaction.

use core::fmt;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, verify_signature};
use crate::error::{Error, Result};

/// A recoverable ECDSA signature on the secp256k1 curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
    v: u8,
}

impl Signature {
    /// Serialized length, `r || s || v`.
    pub const BYTE_LEN: usize = 65;

    /// Creates a signature from its scalars and recovery id.
    #[must_use]
    pub const fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Parses `r || s || v`. Ethereum-style `27`/`28` recovery bytes are
    /// folded to `0`/`1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] on a wrong length or an unknown
    /// recovery byte.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes = exact_len(bytes)?;
        let (r, rest) = bytes.split_at(32);
        let (s, v) = rest.split_at(32);

        let mut sig = Self::new([0; 32], [0; 32], recovery_id(v[0])?);
        sig.r.copy_from_slice(r);
        sig.s.copy_from_slice(s);
        Ok(sig)
    }

    /// Parses `v || r || s`, the order the Ledger Ethereum app answers in.
    ///
    /// # Errors
    ///
    /// Same as [`Signature::from_bytes`].
    pub fn from_vrs_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes = exact_len(bytes)?;
        let mut rsv = [0u8; Self::BYTE_LEN];
        rsv[..64].copy_from_slice(&bytes[1..]);
        rsv[64] = bytes[0];
        Self::from_bytes(&rsv)
    }

    /// Serializes to `r || s || v`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut out = [0u8; Self::BYTE_LEN];
        let (r, rest) = out.split_at_mut(32);
        let (s, v) = rest.split_at_mut(32);
        r.copy_from_slice(&self.r);
        s.copy_from_slice(&self.s);
        v[0] = self.v;
        out
    }

    /// The R scalar, big-endian.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// The S scalar, big-endian and low-S.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Recovery id, `0` or `1`.
    #[must_use]
    pub const fn v(&self) -> u8 {
        self.v
    }

    /// Encodes `r || s || v` as `0x`-prefixed hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Parses the 65-byte hex form, with or without `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] or [`Error::InvalidSignature`].
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(hex_str.trim_start_matches("0x"))?)
    }
}

fn exact_len(bytes: &[u8]) -> Result<&[u8; Signature::BYTE_LEN]> {
    bytes.try_into().map_err(|_| {
        Error::InvalidSignature(format!(
            "signature is {} bytes, want {}",
            bytes.len(),
            Signature::BYTE_LEN
        ))
    })
}

fn recovery_id(v: u8) -> Result<u8> {
    match v {
        0 | 1 => Ok(v),
        27 | 28 => Ok(v - 27),
        other => Err(Error::InvalidSignature(format!(
            "recovery byte {other} is not 0, 1, 27 or 28"
        ))),
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.to_hex()
    }
}

impl TryFrom<String> for Signature {
    type Error = Error;

    fn try_from(hex_str: String) -> Result<Self> {
        Self::from_hex(&hex_str)
    }
}

/// A signature together with the public key that produced it.
///
/// Produced once per sign document and attached to exactly one
/// transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSignature {
    signature: Signature,
    public_key: PublicKey,
}

impl SignerSignature {
    /// Pairs a signature with its public key.
    #[must_use]
    pub const fn new(signature: Signature, public_key: PublicKey) -> Self {
        Self {
            signature,
            public_key,
        }
    }

    /// Returns the signature.
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns the signer's public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Checks the signature against `digest` and the attached key.
    #[must_use]
    pub fn verify(&self, digest: &B256) -> bool {
        verify_signature(digest, &self.signature, &self.public_key)
    }
}
