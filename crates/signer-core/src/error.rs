//! Error types for the ledger signer library.
//!
//! This module provides a single error type [`enum@Error`] covering every
//! failure mode of the signing pipeline, from address parsing to the final
//! envelope assembly.
//!
//! # Error Categories
//!
//! - **Address errors**: malformed Bech32 input (never retried)
//! - **Device errors**: hardware I/O, user rejection, bad derivation paths
//! - **Keyring errors**: duplicate or unknown key names
//! - **Encoding errors**: transactions the encoder cannot represent
//! - **Integrity errors**: signer mismatches and digest disagreements
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::Error;
//!
//! let err = Error::signing_failed("alice", Error::DeviceUnavailable("usb timeout".into()));
//! assert!(err.is_retryable());
//!
//! let err = Error::signing_failed("alice", Error::UserRejected);
//! assert!(!err.is_retryable());
//! ```

use alloy_rlp::Error as AlloyRlpError;
use core::result::Result as CoreResult;
use hex::FromHexError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The main error type for the ledger signer library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Address Codec Errors
    // =========================================================================
    /// The Bech32 checksum (or character set) of an address is invalid.
    #[error("invalid checksum in address {0:?}")]
    InvalidChecksum(String),

    /// The human-readable prefix of an address is not recognised.
    #[error("invalid address prefix {found:?}, expected one of {expected:?}")]
    InvalidPrefix {
        /// The prefix found in the input.
        found: String,
        /// The prefixes accepted by the codec.
        expected: Vec<String>,
    },

    // =========================================================================
    // Hardware Device Errors
    // =========================================================================
    /// The hardware device could not be reached or did not answer in time.
    #[error("hardware device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The user rejected the request on the device.
    #[error("request rejected by the user on the device")]
    UserRejected,

    /// The derivation path is malformed or refused by the device.
    #[error("invalid derivation path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The device failed to produce a usable signature.
    #[error("device signing error: {0}")]
    SigningError(String),

    // =========================================================================
    // Keyring Errors
    // =========================================================================
    /// A key with this name already exists in the keyring.
    #[error("key {0:?} already exists")]
    DuplicateKeyName(String),

    /// No key with this name exists in the keyring.
    #[error("key {0:?} not found")]
    KeyNotFound(String),

    /// Signing with a key failed; the cause is the originating error.
    #[error("signing with key {key:?} failed: {cause}")]
    SigningFailed {
        /// The key used for signing.
        key: String,
        /// The originating error.
        cause: Box<Error>,
    },

    /// The keystore backend failed to load or persist a record.
    #[error("keystore error: {0}")]
    Keystore(String),

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// The transaction contains a value the encoder cannot represent.
    #[error("unsupported field {field:?}: {reason}")]
    UnsupportedField {
        /// The path of the offending field, e.g. `body.messages[1]`.
        field: String,
        /// Why it cannot be encoded.
        reason: String,
    },

    /// The schema-driven and direct structured digests disagree.
    #[error("structured digest mismatch: schema {schema}, direct {direct}")]
    StructuredDigestMismatch {
        /// Digest computed from the JSON type schema.
        schema: String,
        /// Digest computed by the static encoders.
        direct: String,
    },

    /// The EIP-712 typed data is invalid.
    #[error("invalid EIP-712 typed data: {0}")]
    InvalidTypedData(String),

    /// A type referenced in the typed data is not defined.
    #[error("undefined type in EIP-712 data: {0}")]
    UndefinedType(String),

    /// The chain ID is malformed.
    #[error("invalid chain ID {0:?}")]
    InvalidChainId(String),

    /// Failed to RLP encode or decode a value.
    #[error("RLP encoding failed: {0}")]
    RlpEncodingFailed(String),

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// The signature's public key does not match the account's key.
    #[error("signer mismatch: expected public key {expected}, got {actual}")]
    SignerMismatch {
        /// Hex of the account's registered public key.
        expected: String,
        /// Hex of the public key attached to the signature.
        actual: String,
    },

    /// The account sequencer has no record of this address.
    #[error("account {0} not found")]
    AccountNotFound(String),

    /// The signing session was cancelled.
    #[error("signing session cancelled")]
    Cancelled,

    // =========================================================================
    // Cryptographic Errors
    // =========================================================================
    /// The public key is invalid or malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signature is invalid or malformed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The secret key is invalid or malformed.
    #[error("invalid secret key")]
    InvalidSecretKey,

    // =========================================================================
    // Serialization & Configuration Errors
    // =========================================================================
    /// Failed to parse hex data.
    #[error("hex decoding failed: {0}")]
    HexDecodeFailed(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    JsonError(String),

    /// The configuration could not be loaded or saved.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps `cause` as a [`Error::SigningFailed`] for the key `key`.
    #[must_use]
    pub fn signing_failed(key: impl Into<String>, cause: Error) -> Self {
        Error::SigningFailed {
            key: key.into(),
            cause: Box::new(cause),
        }
    }

    /// Returns the innermost error, unwrapping [`Error::SigningFailed`].
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::SigningFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Whether a caller may retry the failed operation with backoff.
    ///
    /// Only [`Error::DeviceUnavailable`] qualifies. A user rejection must
    /// never be retried automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.root_cause(), Error::DeviceUnavailable(_))
    }
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Error::HexDecodeFailed(err.to_string())
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Error::JsonError(err.to_string())
    }
}

impl From<AlloyRlpError> for Error {
    fn from(err: AlloyRlpError) -> Self {
        Error::RlpEncodingFailed(err.to_string())
    }
}

/// A specialized [`Result`] type for signer operations.
pub type Result<T> = CoreResult<T, Error>;

#[cfg(test)]
mod tests {
    use serde_json::{Value, from_str};

    use super::*;

    #[test]
    fn error_display() {
        let err = Error::KeyNotFound("alice".to_string());
        assert_eq!(err.to_string(), "key \"alice\" not found");

        let err = Error::InvalidPath {
            path: "m/44'".to_string(),
            reason: "too short".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid derivation path \"m/44'\": too short"
        );

        let err = Error::signing_failed("bob", Error::UserRejected);
        assert_eq!(
            err.to_string(),
            "signing with key \"bob\" failed: request rejected by the user on the device"
        );
    }

    #[test]
    fn root_cause_unwraps_nested_failures() {
        let err = Error::signing_failed(
            "outer",
            Error::signing_failed("inner", Error::DeviceUnavailable("gone".to_string())),
        );
        assert!(matches!(err.root_cause(), Error::DeviceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn only_device_unavailable_is_retryable() {
        assert!(Error::DeviceUnavailable("busy".to_string()).is_retryable());
        assert!(!Error::UserRejected.is_retryable());
        assert!(!Error::DuplicateKeyName("a".to_string()).is_retryable());
        assert!(!Error::signing_failed("a", Error::SigningError("x".to_string())).is_retryable());
    }

    #[test]
    fn from_hex_error() {
        let hex_err = FromHexError::InvalidHexCharacter { c: 'g', index: 0 };
        let err: Error = hex_err.into();
        assert!(matches!(err, Error::HexDecodeFailed(_)));
    }

    #[test]
    fn from_json_error() {
        let json_err = from_str::<Value>("not valid json{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::JsonError(_)));
    }
}
