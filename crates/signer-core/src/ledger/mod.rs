//! Hardware signing devices.
//!
//! This module defines the capability a hardware signer offers to the
//! keyring, independent of how the device is reached:
//!
//! - [`HardwareDevice`]: derive a public key, sign a byte buffer
//! - [`DerivationPath`]: which key on the device to use
//! - [`DeviceSelector`]: a deferred constructor that yields a fresh device
//!   for each signing session
//!
//! Calls are synchronous and block until the device answers. Nothing here
//! retries; wrap a device in [`TimeoutDevice`] to bound the wait.
//!
//! # Submodules
//!
//! - [`apdu`]: APDU command/response framing and status words
//! - [`path`]: BIP-44 derivation paths
//! - [`ethereum_app`]: the Ledger Ethereum app over an abstract [`Transport`]
//! - [`timeout`]: the timeout guard
//! - [`mock`]: a scriptable device for tests
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::ledger::mock::MockDevice;
//! use ledger_signer_core::ledger::{DeviceClass, device_selector};
//!
//! let handle = MockDevice::new(DeviceClass::EthereumApp).handle();
//! let selector = device_selector(move || Ok(Box::new(handle.device())));
//! let device = selector().unwrap();
//! assert_eq!(device.device_class(), DeviceClass::EthereumApp);
//! ```

pub mod apdu;
pub mod ethereum_app;
pub mod mock;
pub mod path;
pub mod timeout;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use apdu::{Apdu, ApduResponse};
pub use ethereum_app::EthereumApp;
pub use path::DerivationPath;
pub use timeout::TimeoutDevice;

use crate::crypto::{PublicKey, SignatureEncoding};
use crate::error::Result;

/// The firmware application a device runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// The Ethereum app. Only signs structured (EIP-712) payloads and
    /// returns raw `r || s || v` signatures.
    EthereumApp,
    /// The Cosmos app. Signs binary payloads and returns DER signatures.
    CosmosApp,
}

impl DeviceClass {
    /// Whether payloads must be in the human-auditable structured encoding.
    #[must_use]
    pub const fn requires_structured(self) -> bool {
        matches!(self, Self::EthereumApp)
    }

    /// How signatures returned by this class are encoded.
    #[must_use]
    pub const fn signature_encoding(self) -> SignatureEncoding {
        match self {
            Self::EthereumApp => SignatureEncoding::Raw,
            Self::CosmosApp => SignatureEncoding::Der,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EthereumApp => f.write_str("ethereum-app"),
            Self::CosmosApp => f.write_str("cosmos-app"),
        }
    }
}

/// An external signer holding private keys.
pub trait HardwareDevice: Send {
    /// Returns the firmware application class.
    fn device_class(&self) -> DeviceClass;

    /// Derives the public key at `path`.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::DeviceUnavailable`] if the device cannot be reached
    /// - [`crate::Error::UserRejected`] if the user declined
    /// - [`crate::Error::InvalidPath`] if the device refuses the path
    fn get_public_key(&mut self, path: &DerivationPath) -> Result<PublicKey>;

    /// Signs `message` with the key at `path`, returning the signature in
    /// the class's [`SignatureEncoding`].
    ///
    /// # Errors
    ///
    /// - [`crate::Error::DeviceUnavailable`] if the device cannot be reached
    /// - [`crate::Error::UserRejected`] if the user declined
    /// - [`crate::Error::SigningError`] if the device failed to sign
    fn sign_bytes(&mut self, path: &DerivationPath, message: &[u8]) -> Result<Vec<u8>>;
}

impl<D: HardwareDevice + ?Sized> HardwareDevice for Box<D> {
    fn device_class(&self) -> DeviceClass {
        (**self).device_class()
    }

    fn get_public_key(&mut self, path: &DerivationPath) -> Result<PublicKey> {
        (**self).get_public_key(path)
    }

    fn sign_bytes(&mut self, path: &DerivationPath, message: &[u8]) -> Result<Vec<u8>> {
        (**self).sign_bytes(path, message)
    }
}

/// Yields a device instance at call time.
///
/// Fails with [`crate::Error::DeviceUnavailable`] if no device can be
/// opened.
pub type DeviceSelector = Arc<dyn Fn() -> Result<Box<dyn HardwareDevice>> + Send + Sync>;

/// Wraps a closure as a [`DeviceSelector`].
pub fn device_selector<F>(f: F) -> DeviceSelector
where
    F: Fn() -> Result<Box<dyn HardwareDevice>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A transport layer for exchanging APDUs with a device.
///
/// Implementations exist per platform (USB HID, BLE, speculos TCP); none
/// are provided here.
pub trait Transport {
    /// Sends an APDU command and receives a response.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceUnavailable`] if communication fails.
    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse>;

    /// Checks if the transport is still connected.
    fn is_connected(&self) -> bool;
}
