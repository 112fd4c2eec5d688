//! Address derivation and Bech32 encoding.
//!
//! Two address variants are derived from a secp256k1 public key:
//!
//! - **Account** addresses follow the `eth_secp256k1` rule: the last 20
//!   bytes of `keccak256(x || y)` over the uncompressed point, i.e. the same
//!   bytes as the Ethereum address of the key.
//! - **Consensus** addresses follow the Tendermint rule: the first 20 bytes
//!   of `sha256(compressed point)`.
//!
//! Both are rendered as Bech32 strings whose human-readable prefix tells the
//! variants apart (`evmos1…` vs `evmosvalcons1…` by default). Account
//! addresses can also be rendered as EIP-55 checksummed hex.
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::address::{Address, AddressVariant, Bech32Config};
//! use ledger_signer_core::crypto::KeyPair;
//!
//! let key = KeyPair::generate();
//! let codec = Bech32Config::default();
//!
//! let encoded = codec.encode_public_key(key.public_key(), AddressVariant::Account).unwrap();
//! assert!(encoded.starts_with("evmos1"));
//!
//! let decoded = codec.decode(&encoded).unwrap();
//! assert_eq!(decoded, Address::account(key.public_key()));
//! ```

use std::fmt;

use alloy_primitives::{Address as AlloyAddress, keccak256};
use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::PublicKey;
use crate::error::{Error, Result};

/// Which address family an [`Address`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressVariant {
    /// A user account address.
    Account,
    /// A validator consensus address.
    Consensus,
}

/// A 20-byte address tagged with its variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    variant: AddressVariant,
    bytes: [u8; Self::BYTE_LEN],
}

impl Address {
    /// The length of an address in bytes.
    pub const BYTE_LEN: usize = 20;

    /// Creates an address from raw bytes.
    #[must_use]
    pub const fn new(variant: AddressVariant, bytes: [u8; Self::BYTE_LEN]) -> Self {
        Self { variant, bytes }
    }

    /// Derives the address of `public_key` for the given variant.
    #[must_use]
    pub fn from_public_key(public_key: &PublicKey, variant: AddressVariant) -> Self {
        match variant {
            AddressVariant::Account => Self::account(public_key),
            AddressVariant::Consensus => Self::consensus(public_key),
        }
    }

    /// Derives the account address: last 20 bytes of `keccak256(x || y)`.
    #[must_use]
    pub fn account(public_key: &PublicKey) -> Self {
        let uncompressed = public_key.to_uncompressed();
        let hash = keccak256(&uncompressed[1..]);

        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes.copy_from_slice(&hash[12..]);
        Self::new(AddressVariant::Account, bytes)
    }

    /// Derives the consensus address: first 20 bytes of
    /// `sha256(compressed)`.
    #[must_use]
    pub fn consensus(public_key: &PublicKey) -> Self {
        let hash = Sha256::digest(public_key.to_compressed());

        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes.copy_from_slice(&hash[..Self::BYTE_LEN]);
        Self::new(AddressVariant::Consensus, bytes)
    }

    /// Returns the variant.
    #[must_use]
    pub const fn variant(&self) -> AddressVariant {
        self.variant
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::BYTE_LEN] {
        &self.bytes
    }

    /// Returns the raw bytes by value.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        self.bytes
    }

    /// Returns the bytes as an EIP-55 checksummed hex string.
    #[must_use]
    pub fn to_checksum_hex(&self) -> String {
        AlloyAddress::from(self.bytes).to_checksum(None)
    }

    /// Parses an account address from a hex string, optionally prefixed
    /// with `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] if the hex string is invalid, or
    /// [`Error::InvalidPublicKey`] if the decoded bytes are not 20 bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)?;
        let bytes: [u8; Self::BYTE_LEN] = bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidPublicKey(format!(
                "expected {} address bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::new(AddressVariant::Account, bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_checksum_hex())
    }
}

/// Human-readable prefixes of the chain's Bech32 addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bech32Config {
    /// Prefix for account addresses.
    #[serde(default = "default_account_prefix")]
    pub account_prefix: String,

    /// Prefix for consensus addresses.
    #[serde(default = "default_consensus_prefix")]
    pub consensus_prefix: String,
}

fn default_account_prefix() -> String {
    "evmos".to_string()
}

fn default_consensus_prefix() -> String {
    "evmosvalcons".to_string()
}

impl Default for Bech32Config {
    fn default() -> Self {
        Self {
            account_prefix: default_account_prefix(),
            consensus_prefix: default_consensus_prefix(),
        }
    }
}

impl Bech32Config {
    /// Builds a config whose consensus prefix follows the Cosmos SDK
    /// convention `<prefix>valcons`.
    #[must_use]
    pub fn with_account_prefix(prefix: &str) -> Self {
        Self {
            account_prefix: prefix.to_string(),
            consensus_prefix: format!("{prefix}valcons"),
        }
    }

    /// Returns the prefix used for `variant`.
    #[must_use]
    pub fn prefix(&self, variant: AddressVariant) -> &str {
        match variant {
            AddressVariant::Account => &self.account_prefix,
            AddressVariant::Consensus => &self.consensus_prefix,
        }
    }

    /// Encodes `address` as a Bech32 string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPrefix`] if the configured prefix is not a
    /// valid Bech32 human-readable part.
    pub fn encode(&self, address: &Address) -> Result<String> {
        let prefix = self.prefix(address.variant());
        bech32::encode(prefix, address.as_bytes().to_base32(), Variant::Bech32).map_err(|_| {
            Error::InvalidPrefix {
                found: prefix.to_string(),
                expected: self.prefixes(),
            }
        })
    }

    /// Derives the `variant` address of `public_key` and encodes it.
    ///
    /// # Errors
    ///
    /// Same as [`Bech32Config::encode`].
    pub fn encode_public_key(&self, public_key: &PublicKey, variant: AddressVariant) -> Result<String> {
        self.encode(&Address::from_public_key(public_key, variant))
    }

    /// Decodes a Bech32 string into an address, using the prefix to pick
    /// the variant.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidChecksum`] if the checksum, character set or
    ///   payload is invalid
    /// - [`Error::InvalidPrefix`] if the prefix belongs to neither variant
    pub fn decode(&self, encoded: &str) -> Result<Address> {
        let (hrp, data, variant) = bech32::decode(encoded).map_err(|err| match err {
            bech32::Error::MissingSeparator => Error::InvalidPrefix {
                found: String::new(),
                expected: self.prefixes(),
            },
            _ => Error::InvalidChecksum(encoded.to_string()),
        })?;

        if variant != Variant::Bech32 {
            return Err(Error::InvalidChecksum(encoded.to_string()));
        }

        let address_variant = if hrp == self.account_prefix {
            AddressVariant::Account
        } else if hrp == self.consensus_prefix {
            AddressVariant::Consensus
        } else {
            return Err(Error::InvalidPrefix {
                found: hrp,
                expected: self.prefixes(),
            });
        };

        let bytes = Vec::<u8>::from_base32(&data)
            .map_err(|_| Error::InvalidChecksum(encoded.to_string()))?;
        let bytes: [u8; Address::BYTE_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidChecksum(encoded.to_string()))?;

        Ok(Address::new(address_variant, bytes))
    }

    fn prefixes(&self) -> Vec<String> {
        vec![self.account_prefix.clone(), self.consensus_prefix.clone()]
    }
}
