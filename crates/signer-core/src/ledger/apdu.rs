//! APDU command and response framing for Ledger apps.
//!
//! Ledger apps speak short ISO 7816-4 APDUs:
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc | Data  |
//! |-----|-----|----|----|----|-------|
//! | 1B  | 1B  | 1B | 1B | 1B | ≤255B |
//! ```
//!
//! Responses end in a two-byte status word. `0x9000` is success; the other
//! words this crate understands are mapped onto the error taxonomy by
//! [`ApduResponse::to_error`].
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::ledger::{Apdu, ApduResponse};
//!
//! let apdu = Apdu::new(0xE0, 0x02, 0x00, 0x00, vec![0x00]).unwrap();
//! assert_eq!(apdu.to_bytes(), vec![0xE0, 0x02, 0x00, 0x00, 0x01, 0x00]);
//!
//! let response = ApduResponse::from_bytes(vec![0x69, 0x85]).unwrap();
//! assert!(!response.is_success());
//! ```

use crate::error::{Error, Result};

/// Known status words.
pub mod status {
    /// Success.
    pub const OK: u16 = 0x9000;
    /// The user denied the request on the device.
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
    /// Invalid data, including malformed derivation paths.
    pub const INVALID_DATA: u16 = 0x6A80;
    /// Incorrect P1/P2.
    pub const INCORRECT_PARAMETERS: u16 = 0x6B00;
    /// Instruction not supported by the open app.
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    /// Class not supported; usually the wrong app is open.
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;
    /// No app is open.
    pub const APP_NOT_OPEN: u16 = 0x6511;
    /// The device is locked.
    pub const DEVICE_LOCKED: u16 = 0x5515;
}

/// An APDU command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
}

impl Apdu {
    /// Maximum short APDU data length.
    pub const MAX_DATA: usize = 255;

    /// Creates a new APDU command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SigningError`] if `data` exceeds
    /// [`Apdu::MAX_DATA`]; callers chunk larger payloads.
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Result<Self> {
        if data.len() > Self::MAX_DATA {
            return Err(Error::SigningError(format!(
                "APDU data too long: {} > {}",
                data.len(),
                Self::MAX_DATA
            )));
        }
        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
        })
    }

    /// Returns the class byte.
    #[must_use]
    pub const fn cla(&self) -> u8 {
        self.cla
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    /// Returns parameter 1.
    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Returns parameter 2.
    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Returns the command data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes the APDU to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len());
        bytes.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        bytes.push(self.data.len() as u8);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

/// An APDU response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    data: Vec<u8>,
    status_word: u16,
}

impl ApduResponse {
    /// Parses raw response bytes (data followed by SW1 SW2).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if fewer than two bytes arrived.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::DeviceUnavailable(format!(
                "truncated APDU response of {} bytes",
                bytes.len()
            )));
        }

        let sw2 = bytes.pop().unwrap_or_default();
        let sw1 = bytes.pop().unwrap_or_default();
        Ok(Self {
            data: bytes,
            status_word: u16::from_be_bytes([sw1, sw2]),
        })
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the response and returns the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the status word.
    #[must_use]
    pub const fn status_word(&self) -> u16 {
        self.status_word
    }

    /// Checks if the response indicates success (`SW = 0x9000`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_word == status::OK
    }

    /// Returns the data if the response is successful.
    ///
    /// # Errors
    ///
    /// Returns the error [`ApduResponse::to_error`] maps the status word to.
    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(self.to_error())
        }
    }

    /// Converts the status word to an error.
    #[must_use]
    pub fn to_error(&self) -> Error {
        match self.status_word {
            status::CONDITIONS_NOT_SATISFIED => Error::UserRejected,
            status::INVALID_DATA | status::INCORRECT_PARAMETERS => Error::SigningError(format!(
                "device rejected the request (0x{:04X})",
                self.status_word
            )),
            status::INS_NOT_SUPPORTED
            | status::CLA_NOT_SUPPORTED
            | status::APP_NOT_OPEN
            | status::DEVICE_LOCKED => Error::DeviceUnavailable(format!(
                "device not ready (0x{:04X}); unlock it and open the app",
                self.status_word
            )),
            other => Error::SigningError(format!("unexpected status word 0x{other:04X}")),
        }
    }
}
