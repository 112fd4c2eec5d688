//! Durable storage for keyring entries.
//!
//! The keyring hands every new entry to a [`Keystore`] before it becomes
//! visible. Software entries persist their secret scalar; hardware entries
//! persist only the derivation path, the cached public key and the device
//! class.
//!
//! [`FileKeystore`] writes one unencrypted TOML file per key and is meant
//! for tests and throwaway setups. Encryption at rest belongs to whichever
//! keystore a deployment plugs in.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{KeyPair, PublicKey};
use crate::error::{Error, Result};
use crate::ledger::{DerivationPath, DeviceClass};

/// A hex-encoded secret scalar, zeroed on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretHex(String);

impl std::fmt::Debug for SecretHex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretHex(..)")
    }
}

/// What a keystore holds for one key name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyRecord {
    /// A software key.
    Software {
        /// The secret scalar.
        secret_key: SecretHex,
    },
    /// A hardware key. No private material leaves the device.
    Hardware {
        /// The path registered at creation.
        path: DerivationPath,
        /// The public key read from the device at creation.
        public_key: PublicKey,
        /// The firmware app the key lives in.
        class: DeviceClass,
    },
}

impl KeyRecord {
    /// Builds the record for a software key.
    #[must_use]
    pub fn software(key: &KeyPair) -> Self {
        Self::Software {
            secret_key: SecretHex(hex::encode(key.secret_bytes().as_slice())),
        }
    }

    /// Rebuilds the key pair of a software record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Keystore`] for hardware records and
    /// [`Error::InvalidSecretKey`] if the stored scalar is corrupt.
    pub fn to_key_pair(&self) -> Result<KeyPair> {
        match self {
            Self::Software { secret_key } => {
                let bytes = zeroize::Zeroizing::new(
                    hex::decode(&secret_key.0).map_err(|_| Error::InvalidSecretKey)?,
                );
                KeyPair::from_secret_bytes(&bytes)
            }
            Self::Hardware { .. } => Err(Error::Keystore(
                "hardware records hold no key material".to_string(),
            )),
        }
    }
}

/// Persistence for keyring entries.
pub trait Keystore: Send + Sync {
    /// Loads the record stored under `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the record is corrupt.
    fn load(&self, name: &str) -> Result<Option<KeyRecord>>;

    /// Stores `record` under `name`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn save(&self, name: &str, record: &KeyRecord) -> Result<()>;

    /// Removes the record stored under `name`. Missing records are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn delete(&self, name: &str) -> Result<()>;

    /// Lists stored names in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn names(&self) -> Result<Vec<String>>;
}

/// A keystore that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryKeystore {
    records: RwLock<BTreeMap<String, KeyRecord>>,
}

impl MemoryKeystore {
    /// Creates an empty keystore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Keystore for MemoryKeystore {
    fn load(&self, name: &str) -> Result<Option<KeyRecord>> {
        Ok(self.records.read().get(name).cloned())
    }

    fn save(&self, name: &str, record: &KeyRecord) -> Result<()> {
        self.records.write().insert(name.to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.records.write().remove(name);
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>> {
        Ok(self.records.read().keys().cloned().collect())
    }
}

/// One TOML file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileKeystore {
    dir: PathBuf,
}

impl FileKeystore {
    const EXTENSION: &'static str = "toml";

    /// Opens (and creates if needed) the keystore directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "opened file keystore");
        Ok(Self { dir })
    }

    /// Returns the keystore directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::Keystore(format!(
                "key name {name:?} cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{name}.{}", Self::EXTENSION)))
    }
}

impl Keystore for FileKeystore {
    fn load(&self, name: &str) -> Result<Option<KeyRecord>> {
        let path = self.path_for(name)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record = toml::from_str(&raw)
            .map_err(|err| Error::Keystore(format!("failed to decode {name:?}: {err}")))?;
        Ok(Some(record))
    }

    fn save(&self, name: &str, record: &KeyRecord) -> Result<()> {
        let path = self.path_for(name)?;
        let encoded = zeroize::Zeroizing::new(
            toml::to_string_pretty(record)
                .map_err(|err| Error::Keystore(format!("failed to encode {name:?}: {err}")))?,
        );

        let tmp = path.with_extension("toml.tmp");
        write_private(&tmp, encoded.as_bytes())?;
        fs::rename(&tmp, &path)?;
        debug!(key = name, path = %path.display(), "saved key record");
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Writes `bytes` to a fresh file readable only by its owner (on unix).
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != ErrorKind::NotFound
    {
        return Err(err);
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_record_round_trip() {
        let key = KeyPair::generate();
        let record = KeyRecord::software(&key);
        assert_eq!(record.to_key_pair().unwrap().public_key(), key.public_key());
    }

    #[test]
    fn secret_is_not_debug_printed() {
        let key = KeyPair::from_secret_bytes(&[0x42; 32]).unwrap();
        let printed = format!("{:?}", KeyRecord::software(&key));
        assert!(!printed.contains("4242"));
    }

    #[test]
    fn hardware_record_has_no_key_pair() {
        let record = KeyRecord::Hardware {
            path: DerivationPath::default(),
            public_key: KeyPair::generate().public_key().clone(),
            class: DeviceClass::EthereumApp,
        };
        assert!(matches!(record.to_key_pair(), Err(Error::Keystore(_))));
    }

    #[test]
    fn memory_keystore() {
        let store = MemoryKeystore::new();
        let record = KeyRecord::software(&KeyPair::generate());
        store.save("b", &record).unwrap();
        store.save("a", &record).unwrap();
        assert_eq!(store.names().unwrap(), vec!["a", "b"]);
        assert_eq!(store.load("a").unwrap(), Some(record));
        store.delete("a").unwrap();
        assert_eq!(store.load("a").unwrap(), None);
    }

    #[test]
    fn file_keystore_persists_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeystore::open(dir.path().join("keys")).unwrap();

        let software = KeyRecord::software(&KeyPair::generate());
        let hardware = KeyRecord::Hardware {
            path: "m/44'/60'/0'/0/4".parse().unwrap(),
            public_key: KeyPair::generate().public_key().clone(),
            class: DeviceClass::CosmosApp,
        };
        store.save("alice", &software).unwrap();
        store.save("ledger", &hardware).unwrap();

        let reopened = FileKeystore::open(store.dir()).unwrap();
        assert_eq!(reopened.names().unwrap(), vec!["alice", "ledger"]);
        assert_eq!(reopened.load("alice").unwrap(), Some(software));
        assert_eq!(reopened.load("ledger").unwrap(), Some(hardware));
        assert_eq!(reopened.load("bob").unwrap(), None);

        reopened.delete("alice").unwrap();
        reopened.delete("alice").unwrap();
        assert_eq!(reopened.names().unwrap(), vec!["ledger"]);
    }

    #[cfg(unix)]
    #[test]
    fn key_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileKeystore::open(dir.path()).unwrap();
        let file = dir.path().join("alice.toml");

        store.save("alice", &KeyRecord::software(&KeyPair::generate())).unwrap();
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o600);

        // A leftover temp file with looser permissions is replaced.
        fs::write(dir.path().join("alice.toml.tmp"), b"stale").unwrap();
        store.save("alice", &KeyRecord::software(&KeyPair::generate())).unwrap();
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o600);
        assert_eq!(store.names().unwrap(), vec!["alice"]);
    }

    #[test]
    fn file_keystore_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeystore::open(dir.path()).unwrap();
        let record = KeyRecord::software(&KeyPair::generate());
        for bad in ["", "../escape", ".hidden", "a/b"] {
            assert!(matches!(store.save(bad, &record), Err(Error::Keystore(_))));
        }
    }
}
