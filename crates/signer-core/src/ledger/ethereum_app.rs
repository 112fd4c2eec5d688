//! The Ledger Ethereum app over an abstract [`Transport`].
//!
//! Two instructions are used:
//!
//! | INS    | Command                | Data                                        |
//! |--------|------------------------|---------------------------------------------|
//! | `0x02` | `GET_PUBLIC_KEY`       | `path`                                      |
//! | `0x0C` | `SIGN_EIP712_MESSAGE`  | `path || domainSeparator || hashStruct`     |
//!
//! EIP-712 signing uses the v0 (pre-hashed) mode, so the app displays both
//! hashes and the user confirms on the device. The app answers with
//! `v || r || s`; [`EthereumApp`] re-orders that into `r || s || v` so the
//! keyring sees the [`SignatureEncoding::Raw`](crate::crypto::SignatureEncoding)
//! layout.
//!
//! Only structured preimages (`0x19 0x01 || domainSeparator || hashStruct`)
//! can be signed; anything else fails with [`Error::SigningError`].

use core::fmt;

use tracing::{debug, trace};

use super::apdu::{Apdu, ApduResponse, status};
use super::{DerivationPath, DeviceClass, HardwareDevice, Transport};
use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use crate::signature::Signature;

/// The Ethereum app class byte.
pub const CLA: u8 = 0xE0;

/// Ethereum app instruction codes.
mod ins {
    /// `GET_PUBLIC_KEY` instruction.
    pub(super) const GET_PUBLIC_KEY: u8 = 0x02;

    /// `SIGN_EIP712_MESSAGE` instruction.
    pub(super) const SIGN_EIP712: u8 = 0x0C;
}

/// A session with the Ledger Ethereum app.
pub struct EthereumApp<T: Transport> {
    transport: T,
}

impl<T: Transport> fmt::Debug for EthereumApp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthereumApp")
            .field("connected", &self.transport.is_connected())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> EthereumApp<T> {
    /// Creates a session over `transport`.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the underlying transport.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        if !self.transport.is_connected() {
            return Err(Error::DeviceUnavailable("transport disconnected".to_string()));
        }
        trace!(ins = apdu.ins(), len = apdu.data().len(), "sending APDU");
        let response = self.transport.transmit(apdu)?;
        trace!(status = response.status_word(), "received APDU response");
        Ok(response)
    }

    fn exchange(&mut self, apdu: &Apdu) -> Result<Vec<u8>> {
        self.transmit(apdu)?.into_result()
    }

    /// Reads the uncompressed public key at `path` without on-screen
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the app refuses `path`, the mapped
    /// status word error otherwise, or [`Error::InvalidPublicKey`] if the
    /// response is malformed.
    pub fn get_public_key(&mut self, path: &DerivationPath) -> Result<PublicKey> {
        let apdu = Apdu::new(CLA, ins::GET_PUBLIC_KEY, 0x00, 0x00, path.to_apdu_bytes())?;
        let response = self.transmit(&apdu)?;
        match response.status_word() {
            status::INVALID_DATA | status::INCORRECT_PARAMETERS => Err(Error::InvalidPath {
                path: path.to_string(),
                reason: format!("refused by the device (0x{:04X})", response.status_word()),
            }),
            _ => parse_public_key_response(&response.into_result()?),
        }
    }

    /// Signs a pre-hashed EIP-712 message, returning `v || r || s` as the
    /// app produces it.
    ///
    /// # Errors
    ///
    /// Returns the mapped status word error, or [`Error::SigningError`] if
    /// the response is not 65 bytes.
    pub fn sign_eip712_hashed(
        &mut self,
        path: &DerivationPath,
        domain_separator: &[u8; 32],
        struct_hash: &[u8; 32],
    ) -> Result<[u8; 65]> {
        let mut data = path.to_apdu_bytes();
        data.extend_from_slice(domain_separator);
        data.extend_from_slice(struct_hash);

        let apdu = Apdu::new(CLA, ins::SIGN_EIP712, 0x00, 0x00, data)?;
        let response = self.exchange(&apdu)?;

        response.as_slice().try_into().map_err(|_| {
            Error::SigningError(format!(
                "expected 65 signature bytes, got {}",
                response.len()
            ))
        })
    }
}

impl<T: Transport + Send> HardwareDevice for EthereumApp<T> {
    fn device_class(&self) -> DeviceClass {
        DeviceClass::EthereumApp
    }

    fn get_public_key(&mut self, path: &DerivationPath) -> Result<PublicKey> {
        Self::get_public_key(self, path)
    }

    fn sign_bytes(&mut self, path: &DerivationPath, message: &[u8]) -> Result<Vec<u8>> {
        let (domain_separator, struct_hash) = split_structured_preimage(message)?;
        debug!(%path, "requesting EIP-712 signature on device");

        let vrs = self.sign_eip712_hashed(path, &domain_separator, &struct_hash)?;
        let signature = Signature::from_vrs_bytes(&vrs)
            .map_err(|e| Error::SigningError(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

/// Splits `0x19 0x01 || domainSeparator || hashStruct`.
fn split_structured_preimage(message: &[u8]) -> Result<([u8; 32], [u8; 32])> {
    if message.len() != 66 || message[..2] != [0x19, 0x01] {
        return Err(Error::SigningError(
            "the Ethereum app only signs EIP-712 preimages".to_string(),
        ));
    }

    let mut domain_separator = [0u8; 32];
    let mut struct_hash = [0u8; 32];
    domain_separator.copy_from_slice(&message[2..34]);
    struct_hash.copy_from_slice(&message[34..66]);
    Ok((domain_separator, struct_hash))
}

/// Parses `pk_len || pk || addr_len || addr [|| chain_code]`.
fn parse_public_key_response(data: &[u8]) -> Result<PublicKey> {
    let (&len, rest) = data
        .split_first()
        .ok_or_else(|| Error::InvalidPublicKey("empty response".to_string()))?;

    let key = rest.get(..usize::from(len)).ok_or_else(|| {
        Error::InvalidPublicKey(format!(
            "response holds {} bytes, key length is {len}",
            rest.len()
        ))
    })?;

    PublicKey::from_sec1_bytes(key)
}
