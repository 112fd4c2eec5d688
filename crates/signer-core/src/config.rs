//! TOML configuration.
//!
//! ```toml
//! [chain]
//! chain_id = "evmos_9001-2"
//! account_prefix = "evmos"
//! consensus_prefix = "evmosvalcons"
//! fee_denom = "aevmos"
//!
//! [device]
//! timeout_ms = 30000
//! hd_path = "m/44'/60'/0'/0/0"
//!
//! [keystore]
//! dir = "./keyring-test"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::Bech32Config;
use crate::error::{Error, Result};
use crate::keyring::{FileKeystore, Keyring};
use crate::ledger::DerivationPath;
use crate::transaction::Coin;

/// The complete signer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Chain parameters.
    pub chain: ChainConfig,
    /// Hardware device settings.
    pub device: DeviceConfig,
    /// Keystore location.
    pub keystore: KeystoreConfig,
}

impl SignerConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Config`] if it is malformed or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), chain_id = %config.chain.chain_id, "loaded config");
        Ok(config)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is malformed or invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|err| Error::Config(format!("unable to parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Config`] on failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| Error::Config(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Checks values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let chain = &self.chain;
        if chain.chain_id.trim().is_empty() {
            return Err(Error::Config("chain.chain_id is empty".to_string()));
        }
        if chain.account_prefix.is_empty() || chain.consensus_prefix.is_empty() {
            return Err(Error::Config("address prefixes must not be empty".to_string()));
        }
        if chain.account_prefix == chain.consensus_prefix {
            return Err(Error::Config(
                "account and consensus prefixes must differ".to_string(),
            ));
        }
        Coin::new(&chain.fee_denom, 0)
            .map_err(|err| Error::Config(format!("chain.fee_denom: {err}")))?;
        Ok(())
    }

    /// Opens the configured file keystore and builds a keyring over it.
    ///
    /// The keyring registers hardware keys at `device.hd_path` by default
    /// and bounds device calls by `device.timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the keystore directory cannot be created.
    pub fn keyring(&self) -> Result<Keyring> {
        let keystore = FileKeystore::open(&self.keystore.dir)?;
        let keyring = Keyring::new(Arc::new(keystore)).with_hd_path(self.device.hd_path.clone());
        Ok(match self.device.timeout() {
            Some(timeout) => keyring.with_device_timeout(timeout),
            None => keyring,
        })
    }
}

/// Chain parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// The Cosmos chain id, `<name>_<eip155>-<epoch>`.
    pub chain_id: String,
    /// Bech32 prefix of account addresses.
    pub account_prefix: String,
    /// Bech32 prefix of consensus addresses.
    pub consensus_prefix: String,
    /// Denomination fees are paid in.
    pub fee_denom: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        let bech32 = Bech32Config::default();
        Self {
            chain_id: "evmos_9001-2".to_string(),
            account_prefix: bech32.account_prefix,
            consensus_prefix: bech32.consensus_prefix,
            fee_denom: "aevmos".to_string(),
        }
    }
}

impl ChainConfig {
    /// Returns the address codec for this chain.
    #[must_use]
    pub fn bech32(&self) -> Bech32Config {
        Bech32Config {
            account_prefix: self.account_prefix.clone(),
            consensus_prefix: self.consensus_prefix.clone(),
        }
    }
}

/// Hardware device settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Per-call timeout in milliseconds; `0` waits forever.
    pub timeout_ms: u64,
    /// Path [`Keyring::create_default_hardware`] registers.
    pub hd_path: DerivationPath,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            hd_path: DerivationPath::default(),
        }
    }
}

impl DeviceConfig {
    /// Returns the per-call timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }
}

/// Keystore location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    /// Directory of the file keystore.
    pub dir: PathBuf,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./keyring-test"),
        }
    }
}
