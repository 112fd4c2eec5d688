//! The key backend registry.
//!
//! A [`Keyring`] maps key names to entries of two kinds:
//!
//! - **software**: a [`KeyPair`] held in process memory
//! - **hardware**: a derivation path, the public key cached at registration
//!   and a [`DeviceSelector`] that opens a device whenever a signature is
//!   needed
//!
//! Both kinds sign through [`Keyring::sign`] and return a
//! [`SignerSignature`] over `keccak256(message)`.
//!
//! Lookups take a shared lock. Creation, restoration and deletion take the
//! exclusive lock for the whole operation, including the keystore write, so
//! a failed call never leaves a partial entry behind. Hardware signing
//! releases the lock before the device is opened.
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::keyring::Keyring;
//!
//! let keyring = Keyring::in_memory();
//! let info = keyring.create_software("alice").unwrap();
//! let signature = keyring.sign("alice", b"payload").unwrap();
//! assert_eq!(signature.public_key(), &info.public_key);
//! ```

pub mod keystore;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::keccak256;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

pub use keystore::{FileKeystore, KeyRecord, Keystore, MemoryKeystore};

use crate::address::Address;
use crate::crypto::{KeyPair, PublicKey, signature_from_device};
use crate::encoding::SignMode;
use crate::error::{Error, Result};
use crate::ledger::{DerivationPath, DeviceClass, DeviceSelector, HardwareDevice, TimeoutDevice};
use crate::signature::SignerSignature;

/// A hardware-backed key.
#[derive(Clone)]
pub struct HardwareKey {
    path: DerivationPath,
    public_key: PublicKey,
    class: DeviceClass,
    selector: DeviceSelector,
}

impl fmt::Debug for HardwareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareKey")
            .field("path", &self.path)
            .field("public_key", &self.public_key)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl HardwareKey {
    /// Returns the registered derivation path.
    #[must_use]
    pub const fn path(&self) -> &DerivationPath {
        &self.path
    }

    /// Returns the cached public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns the device class seen at registration.
    #[must_use]
    pub const fn class(&self) -> DeviceClass {
        self.class
    }
}

/// A keyring entry.
#[derive(Debug)]
pub enum KeyringEntry {
    /// Key material held in memory.
    Software(KeyPair),
    /// Key material held by a device.
    Hardware(HardwareKey),
}

impl KeyringEntry {
    /// Returns the public key without touching private material.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        match self {
            Self::Software(key) => key.public_key(),
            Self::Hardware(key) => &key.public_key,
        }
    }

    fn kind(&self) -> KeyKind {
        match self {
            Self::Software(_) => KeyKind::Software,
            Self::Hardware(key) => KeyKind::Hardware {
                path: key.path.clone(),
                class: key.class,
            },
        }
    }
}

/// Where a key lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    /// In process memory.
    Software,
    /// On a hardware device.
    Hardware {
        /// The derivation path.
        path: DerivationPath,
        /// The firmware app.
        class: DeviceClass,
    },
}

/// The public description of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// The key name.
    pub name: String,
    /// The public key.
    pub public_key: PublicKey,
    /// The account address of the key.
    pub address: Address,
    /// Where the key lives.
    pub kind: KeyKind,
}

impl KeyInfo {
    fn new(name: &str, entry: &KeyringEntry) -> Self {
        let public_key = entry.public_key().clone();
        Self {
            name: name.to_string(),
            address: Address::account(&public_key),
            public_key,
            kind: entry.kind(),
        }
    }
}

/// A named collection of software and hardware keys.
pub struct Keyring {
    entries: RwLock<BTreeMap<String, KeyringEntry>>,
    keystore: Arc<dyn Keystore>,
    hd_path: DerivationPath,
    device_timeout: Option<Duration>,
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("keys", &self.entries.read().keys().collect::<Vec<_>>())
            .field("hd_path", &self.hd_path)
            .field("device_timeout", &self.device_timeout)
            .finish_non_exhaustive()
    }
}

impl Keyring {
    /// Creates an empty keyring persisting to `keystore`.
    #[must_use]
    pub fn new(keystore: Arc<dyn Keystore>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            keystore,
            hd_path: DerivationPath::default(),
            device_timeout: None,
        }
    }

    /// Creates an empty keyring backed by a [`MemoryKeystore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeystore::new()))
    }

    /// Sets the path [`Keyring::create_default_hardware`] registers.
    #[must_use]
    pub fn with_hd_path(mut self, path: DerivationPath) -> Self {
        self.hd_path = path;
        self
    }

    /// Returns the default derivation path for new hardware keys.
    #[must_use]
    pub const fn hd_path(&self) -> &DerivationPath {
        &self.hd_path
    }

    /// Bounds every device call by `timeout`.
    #[must_use]
    pub const fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = Some(timeout);
        self
    }

    /// Generates and stores a new software key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKeyName`] if `name` is taken, or the
    /// keystore error if persisting fails.
    pub fn create_software(&self, name: &str) -> Result<KeyInfo> {
        self.import_software(name, KeyPair::generate())
    }

    /// Stores an existing software key.
    ///
    /// # Errors
    ///
    /// Same as [`Keyring::create_software`].
    pub fn import_software(&self, name: &str, key: KeyPair) -> Result<KeyInfo> {
        let record = KeyRecord::software(&key);
        self.insert(name, &record, KeyringEntry::Software(key))
    }

    /// Registers a hardware key, reading its public key from the device.
    ///
    /// The device is opened once here to fetch the public key; signing
    /// opens a fresh one through `selector` each time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKeyName`] if `name` is taken, the device
    /// error if the public key cannot be read, or the keystore error if
    /// persisting fails.
    pub fn create_hardware(
        &self,
        name: &str,
        path: DerivationPath,
        selector: DeviceSelector,
    ) -> Result<KeyInfo> {
        self.ensure_free(name)?;

        let mut device = self.open_device(&selector)?;
        let class = device.device_class();
        let public_key = device.get_public_key(&path)?;
        debug!(key = name, %path, %class, "read public key from device");

        let record = KeyRecord::Hardware {
            path: path.clone(),
            public_key: public_key.clone(),
            class,
        };
        let entry = KeyringEntry::Hardware(HardwareKey {
            path,
            public_key,
            class,
            selector,
        });
        self.insert(name, &record, entry)
    }

    /// Registers a hardware key at the keyring's default path.
    ///
    /// # Errors
    ///
    /// Same as [`Keyring::create_hardware`].
    pub fn create_default_hardware(&self, name: &str, selector: DeviceSelector) -> Result<KeyInfo> {
        self.create_hardware(name, self.hd_path.clone(), selector)
    }

    /// Loads `name` from the keystore into the keyring.
    ///
    /// Hardware records need `selector`; the device is not contacted.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateKeyName`] if `name` is already loaded
    /// - [`Error::KeyNotFound`] if the keystore has no such record
    /// - [`Error::Keystore`] for a hardware record without a selector
    pub fn restore(&self, name: &str, selector: Option<DeviceSelector>) -> Result<KeyInfo> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(Error::DuplicateKeyName(name.to_string()));
        }

        let record = self
            .keystore
            .load(name)?
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;

        let entry = match record {
            KeyRecord::Software { .. } => KeyringEntry::Software(record.to_key_pair()?),
            KeyRecord::Hardware {
                path,
                public_key,
                class,
            } => {
                let selector = selector.ok_or_else(|| {
                    Error::Keystore(format!("hardware key {name:?} needs a device selector"))
                })?;
                KeyringEntry::Hardware(HardwareKey {
                    path,
                    public_key,
                    class,
                    selector,
                })
            }
        };

        let info = KeyInfo::new(name, &entry);
        entries.insert(name.to_string(), entry);
        info!(key = name, "restored key");
        Ok(info)
    }

    /// Returns the public key of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] for unknown names.
    pub fn get_public_key(&self, name: &str) -> Result<PublicKey> {
        self.with_entry(name, |entry| entry.public_key().clone())
    }

    /// Returns the account address of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] for unknown names.
    pub fn address(&self, name: &str) -> Result<Address> {
        self.with_entry(name, |entry| Address::account(entry.public_key()))
    }

    /// Returns the description of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] for unknown names.
    pub fn key(&self, name: &str) -> Result<KeyInfo> {
        self.with_entry(name, |entry| KeyInfo::new(name, entry))
    }

    /// Returns the encoding a signature by `name` must cover.
    ///
    /// Structured mode is chosen only for hardware keys whose device class
    /// requires human-auditable payloads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] for unknown names.
    pub fn sign_mode(&self, name: &str) -> Result<SignMode> {
        self.with_entry(name, |entry| match entry {
            KeyringEntry::Hardware(key) if key.class.requires_structured() => SignMode::Structured,
            _ => SignMode::Binary,
        })
    }

    /// Lists every loaded key, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<KeyInfo> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| KeyInfo::new(name, entry))
            .collect()
    }

    /// Removes `name` from the keyring and the keystore.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] for unknown names, or the keystore
    /// error (the entry is kept in that case).
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if !entries.contains_key(name) {
            return Err(Error::KeyNotFound(name.to_string()));
        }
        self.keystore.delete(name)?;
        entries.remove(name);
        info!(key = name, "deleted key");
        Ok(())
    }

    /// Signs `keccak256(message)` with `name`.
    ///
    /// Hardware keys open a device through their selector, send `message`
    /// to the registered path and check the returned signature against the
    /// cached public key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] for unknown names and
    /// [`Error::SigningFailed`] wrapping whatever went wrong while signing.
    pub fn sign(&self, name: &str, message: &[u8]) -> Result<SignerSignature> {
        let digest = keccak256(message);

        let hardware = {
            let entries = self.entries.read();
            match entries.get(name) {
                None => return Err(Error::KeyNotFound(name.to_string())),
                Some(KeyringEntry::Software(key)) => {
                    debug!(key = name, %digest, "signing with software key");
                    let signature = key
                        .sign_digest(&digest)
                        .map_err(|e| Error::signing_failed(name, e))?;
                    return Ok(SignerSignature::new(signature, key.public_key().clone()));
                }
                Some(KeyringEntry::Hardware(key)) => key.clone(),
            }
        };

        debug!(key = name, path = %hardware.path, class = %hardware.class, %digest, "signing with hardware key");
        let signature = self
            .open_device(&hardware.selector)
            .and_then(|mut device| device.sign_bytes(&hardware.path, message))
            .and_then(|response| {
                signature_from_device(
                    &response,
                    hardware.class.signature_encoding(),
                    &digest,
                    &hardware.public_key,
                )
            })
            .map_err(|e| {
                warn!(key = name, error = %e, "hardware signing failed");
                Error::signing_failed(name, e)
            })?;

        Ok(SignerSignature::new(signature, hardware.public_key))
    }

    fn open_device(&self, selector: &DeviceSelector) -> Result<Box<dyn HardwareDevice>> {
        let device = selector()?;
        match self.device_timeout {
            Some(timeout) => Ok(Box::new(TimeoutDevice::new(device, timeout)?)),
            None => Ok(device),
        }
    }

    fn with_entry<T>(&self, name: &str, f: impl FnOnce(&KeyringEntry) -> T) -> Result<T> {
        self.entries
            .read()
            .get(name)
            .map(f)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        if self.entries.read().contains_key(name) || self.keystore.load(name)?.is_some() {
            return Err(Error::DuplicateKeyName(name.to_string()));
        }
        Ok(())
    }

    fn insert(&self, name: &str, record: &KeyRecord, entry: KeyringEntry) -> Result<KeyInfo> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) || self.keystore.load(name)?.is_some() {
            return Err(Error::DuplicateKeyName(name.to_string()));
        }

        self.keystore.save(name, record)?;
        let info = KeyInfo::new(name, &entry);
        entries.insert(name.to_string(), entry);
        info!(key = name, kind = ?info.kind, "created key");
        Ok(info)
    }
}
