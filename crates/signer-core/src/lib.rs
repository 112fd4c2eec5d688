//! Ledger Signer Core Library
//!
//! Pluggable signing and key custody for Cosmos chains with Ethereum-style
//! keys (Evmos/Ethermint `eth_secp256k1`), with optional delegation of the
//! private-key operation to a Ledger hardware wallet.
//!
//! # Overview
//!
//! One signing contract covers two trust boundaries: keys held in process
//! memory and keys held by an external device reachable only through a
//! narrow request/response protocol. Signatures cover one of two canonical
//! encodings of the same transaction:
//!
//! - **Binary**: an RLP sign document
//! - **Structured**: an EIP-712 payload a device can display, hashed two
//!   independent ways that must agree before anything is signed
//!
//! This library provides:
//!
//! - **Address Codec**: account and consensus addresses, Bech32 and EIP-55
//! - **Hardware Devices**: the device capability, derivation paths, a
//!   timeout guard, the Ledger Ethereum app over APDUs and a scriptable mock
//! - **Keyring**: named software and hardware keys over a pluggable keystore
//! - **Encoder**: binary and structured sign bytes
//! - **Orchestrator**: account lookup, encoding, signing and assembly
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Signing Orchestrator                      │
//! ├──────────────┬──────────────┬───────────────┬───────────────┤
//! │   Account    │   Encoder    │    Keyring    │  Transaction  │
//! │  Retriever   │ (RLP/EIP-712)│               │   Envelope    │
//! ├──────────────┴──────────────┼───────────────┴───────────────┤
//! │        Address Codec        │   Keystore    │   Hardware    │
//! │                             │               │    Device     │
//! │                             │               │ ┌───────────┐ │
//! │                             │               │ │ Timeout   │ │
//! │                             │               │ │ Eth App   │ │
//! │                             │               │ │ Mock      │ │
//! │                             │               │ └───────────┘ │
//! └─────────────────────────────┴───────────────┴───────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Addresses
//!
//! ```rust
//! use ledger_signer_core::address::{Address, AddressVariant, Bech32Config};
//! use ledger_signer_core::crypto::KeyPair;
//!
//! let key = KeyPair::generate();
//! let codec = Bech32Config::default();
//!
//! let encoded = codec.encode_public_key(key.public_key(), AddressVariant::Account).unwrap();
//! assert!(encoded.starts_with("evmos1"));
//! assert_eq!(codec.decode(&encoded).unwrap(), Address::account(key.public_key()));
//! ```
//!
//! ## Hardware Keys
//!
//! ```rust
//! use ledger_signer_core::keyring::Keyring;
//! use ledger_signer_core::ledger::mock::MockDevice;
//! use ledger_signer_core::ledger::{DerivationPath, DeviceClass};
//! use ledger_signer_core::crypto::KeyPair;
//! use ledger_signer_core::encoding::SignMode;
//!
//! let device_key = KeyPair::generate();
//! let handle = MockDevice::new(DeviceClass::EthereumApp).handle();
//! handle.expect_get_public_key(&DerivationPath::default(), Ok(device_key.public_key().clone()));
//!
//! let keyring = Keyring::in_memory();
//! keyring.create_hardware("ledger", DerivationPath::default(), handle.selector()).unwrap();
//! assert_eq!(keyring.sign_mode("ledger").unwrap(), SignMode::Structured);
//! ```
//!
//! # Security Considerations
//!
//! - Hardware keys persist only their path, public key and device class
//! - Software secrets are zeroed on drop and never logged or debug-printed
//! - Signatures are normalized to low-S form to prevent malleability
//! - Device signatures are checked against the cached public key

// Modules
pub mod account;
pub mod address;
pub mod config;
pub mod crypto;
pub mod eip712;
pub mod encoding;
pub mod error;
pub mod keyring;
pub mod ledger;
pub mod orchestrator;
pub mod signature;
pub mod transaction;

// Re-exports for convenience
pub use account::{AccountInfo, AccountRetriever};
pub use address::{Address, AddressVariant, Bech32Config};
pub use config::SignerConfig;
pub use crypto::{KeyPair, PublicKey};
pub use eip712::{Eip712Domain, TypedData};
pub use encoding::{SignMode, SignPayload};
pub use error::{Error, Result};
pub use keyring::Keyring;
pub use ledger::{DerivationPath, DeviceClass, DeviceSelector, HardwareDevice};
pub use orchestrator::{CancelToken, Orchestrator, TxRequest};
pub use signature::{Signature, SignerSignature};
pub use transaction::{SignDoc, SignedTx};

// Re-export commonly used alloy types
pub use alloy_primitives::{B256, U256};
