//! BIP-32/BIP-44 derivation paths.
//!
//! A path selects which key a hardware device derives. Paths are written
//! `m/44'/60'/0'/0/0`; an apostrophe (or `h`) marks a hardened index.
//!
//! | Level   | Ethermint default |
//! |---------|-------------------|
//! | purpose | `44'`             |
//! | coin    | `60'`             |
//! | account | `0'`              |
//! | change  | `0`               |
//! | index   | `0`               |
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::ledger::DerivationPath;
//!
//! let path: DerivationPath = "m/44'/60'/0'/0/3".parse().unwrap();
//! assert_eq!(path.depth(), 5);
//! assert_eq!(path.to_string(), "m/44'/60'/0'/0/3");
//! ```

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{Error, Result};

/// The hardened-index flag.
pub const HARDENED: u32 = 0x8000_0000;

/// A derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    components: Vec<u32>,
}

impl DerivationPath {
    /// The deepest path devices accept.
    pub const MAX_DEPTH: usize = 10;

    /// The Ethermint default, `m/44'/60'/0'/0/0`.
    pub const ETHERMINT_DEFAULT: &'static str = "m/44'/60'/0'/0/0";

    /// Creates a path from raw components (hardened bit included).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the path is empty or deeper than
    /// [`DerivationPath::MAX_DEPTH`].
    pub fn new(components: Vec<u32>) -> Result<Self> {
        let path = Self { components };
        if path.components.is_empty() {
            return Err(path.invalid("path is empty"));
        }
        if path.components.len() > Self::MAX_DEPTH {
            return Err(path.invalid(&format!(
                "depth {} exceeds {}",
                path.components.len(),
                Self::MAX_DEPTH
            )));
        }
        Ok(path)
    }

    /// Builds the BIP-44 path `m/44'/coin'/account'/0/index`.
    #[must_use]
    pub fn bip44(coin_type: u32, account: u32, index: u32) -> Self {
        Self {
            components: vec![
                44 | HARDENED,
                (coin_type & !HARDENED) | HARDENED,
                (account & !HARDENED) | HARDENED,
                0,
                index & !HARDENED,
            ],
        }
    }

    /// Returns the raw components.
    #[must_use]
    pub fn components(&self) -> &[u32] {
        &self.components
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Serializes the path for APDUs: `depth || u32be...`.
    #[must_use]
    pub fn to_apdu_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 * self.components.len());
        out.push(self.components.len() as u8);
        for component in &self.components {
            out.extend_from_slice(&component.to_be_bytes());
        }
        out
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::InvalidPath {
            path: self.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Default for DerivationPath {
    fn default() -> Self {
        Self::bip44(60, 0, 0)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for component in &self.components {
            if component & HARDENED != 0 {
                write!(f, "/{}'", component & !HARDENED)?;
            } else {
                write!(f, "/{component}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidPath {
            path: s.to_string(),
            reason,
        };

        let rest = s
            .strip_prefix("m/")
            .ok_or_else(|| invalid("must start with \"m/\"".to_string()))?;

        let components = rest
            .split('/')
            .map(|level| {
                let (digits, hardened) = match level
                    .strip_suffix('\'')
                    .or_else(|| level.strip_suffix('h'))
                {
                    Some(digits) => (digits, true),
                    None => (level, false),
                };

                let index: u32 = digits
                    .parse()
                    .map_err(|_| invalid(format!("invalid level {level:?}")))?;
                if index & HARDENED != 0 {
                    return Err(invalid(format!("index {index} out of range")));
                }
                Ok(if hardened { index | HARDENED } else { index })
            })
            .collect::<Result<Vec<u32>>>()?;

        Self::new(components)
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_ethermint_path() {
        let path = DerivationPath::default();
        assert_eq!(path.to_string(), DerivationPath::ETHERMINT_DEFAULT);
        assert_eq!(
            DerivationPath::ETHERMINT_DEFAULT.parse::<DerivationPath>().unwrap(),
            path
        );
    }

    #[test]
    fn parse_hardened_markers() {
        let path: DerivationPath = "m/44h/118h/0h/0/7".parse().unwrap();
        assert_eq!(
            path.components(),
            &[44 | HARDENED, 118 | HARDENED, HARDENED, 0, 7]
        );
        assert_eq!(path.to_string(), "m/44'/118'/0'/0/7");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "m", "m/", "44'/60'", "m/44'/x", "m/44''", "m/2147483648"] {
            assert!(
                matches!(bad.parse::<DerivationPath>(), Err(Error::InvalidPath { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_too_deep() {
        let deep = format!("m{}", "/0".repeat(11));
        assert!(matches!(
            deep.parse::<DerivationPath>(),
            Err(Error::InvalidPath { .. })
        ));
        assert!(DerivationPath::new(vec![0; 10]).is_ok());
        assert!(DerivationPath::new(vec![]).is_err());
    }

    #[test]
    fn apdu_serialization() {
        let bytes = DerivationPath::default().to_apdu_bytes();
        assert_eq!(
            bytes,
            vec![
                5, 0x80, 0, 0, 44, 0x80, 0, 0, 60, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0
            ]
        );
    }

    #[test]
    fn serde_as_string() {
        let path = DerivationPath::bip44(60, 1, 2);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"m/44'/60'/1'/0/2\"");
        assert_eq!(serde_json::from_str::<DerivationPath>(&json).unwrap(), path);
    }
}
