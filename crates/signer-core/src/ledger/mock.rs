//! A scriptable [`HardwareDevice`] for tests.
//!
//! A [`MockHandle`] owns an ordered script of expectations. Every
//! [`MockDevice`] created from the handle shares that script, so a test can
//! hand devices to a [`DeviceSelector`] and still inspect the calls
//! afterwards.
//!
//! Each device call pops the next expectation. The call must match its
//! kind, derivation path and (for signing) message byte for byte, or the
//! device panics with both sides printed. Calling an exhausted script also
//! panics: that is a broken test, not a device error.
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::ledger::mock::{DeviceFault, MockDevice};
//! use ledger_signer_core::ledger::{DerivationPath, DeviceClass, HardwareDevice};
//! use ledger_signer_core::Error;
//!
//! let handle = MockDevice::new(DeviceClass::CosmosApp).handle();
//! let path = DerivationPath::default();
//! handle.expect_sign(&path, b"payload", Err(DeviceFault::UserRejected));
//!
//! let mut device = handle.device();
//! assert!(matches!(device.sign_bytes(&path, b"payload"), Err(Error::UserRejected)));
//! handle.assert_done();
//! assert_eq!(handle.sign_calls(), 1);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{DerivationPath, DeviceClass, DeviceSelector, HardwareDevice, device_selector};
use crate::crypto::PublicKey;
use crate::error::{Error, Result};

/// An error a scripted call answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    /// [`Error::DeviceUnavailable`].
    Unavailable,
    /// [`Error::UserRejected`].
    UserRejected,
    /// [`Error::InvalidPath`].
    InvalidPath,
    /// [`Error::SigningError`].
    SigningError,
}

impl DeviceFault {
    fn into_error(self, path: &DerivationPath) -> Error {
        match self {
            Self::Unavailable => Error::DeviceUnavailable("mock device unavailable".to_string()),
            Self::UserRejected => Error::UserRejected,
            Self::InvalidPath => Error::InvalidPath {
                path: path.to_string(),
                reason: "rejected by mock device".to_string(),
            },
            Self::SigningError => Error::SigningError("mock device failed to sign".to_string()),
        }
    }
}

/// A call received by a mock device.
#[derive(Clone, PartialEq, Eq)]
pub enum MockCall {
    /// [`HardwareDevice::get_public_key`].
    GetPublicKey {
        /// Requested path.
        path: DerivationPath,
    },
    /// [`HardwareDevice::sign_bytes`].
    Sign {
        /// Requested path.
        path: DerivationPath,
        /// Bytes to sign.
        message: Vec<u8>,
    },
}

impl fmt::Debug for MockCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetPublicKey { path } => write!(f, "get_public_key({path})"),
            Self::Sign { path, message } => {
                write!(f, "sign_bytes({path}, 0x{})", hex::encode(message))
            }
        }
    }
}

enum Response {
    PublicKey(std::result::Result<PublicKey, DeviceFault>),
    Signature(std::result::Result<Vec<u8>, DeviceFault>),
}

struct Expectation {
    call: MockCall,
    response: Response,
}

#[derive(Default)]
struct Script {
    expectations: VecDeque<Expectation>,
    calls: Vec<MockCall>,
}

impl Script {
    fn next(&mut self, call: MockCall) -> Response {
        self.calls.push(call.clone());
        let Some(expectation) = self.expectations.pop_front() else {
            panic!("mock device: unexpected call {call:?}; script is exhausted");
        };
        assert!(
            expectation.call == call,
            "mock device: call #{} mismatch\n  expected: {:?}\n    actual: {:?}",
            self.calls.len(),
            expectation.call,
            call
        );
        expectation.response
    }
}

/// A scripted hardware device.
pub struct MockDevice {
    class: DeviceClass,
    script: Arc<Mutex<Script>>,
}

impl fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDevice")
            .field("class", &self.class)
            .field("remaining", &self.script.lock().expectations.len())
            .finish()
    }
}

impl MockDevice {
    /// Creates a device with an empty script.
    #[must_use]
    pub fn new(class: DeviceClass) -> Self {
        Self {
            class,
            script: Arc::default(),
        }
    }

    /// Returns a handle to this device's script.
    #[must_use]
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            class: self.class,
            script: Arc::clone(&self.script),
        }
    }
}

impl HardwareDevice for MockDevice {
    fn device_class(&self) -> DeviceClass {
        self.class
    }

    fn get_public_key(&mut self, path: &DerivationPath) -> Result<PublicKey> {
        let call = MockCall::GetPublicKey { path: path.clone() };
        match self.script.lock().next(call) {
            Response::PublicKey(answer) => answer.map_err(|fault| fault.into_error(path)),
            Response::Signature(_) => unreachable!("expectation kinds are matched by call"),
        }
    }

    fn sign_bytes(&mut self, path: &DerivationPath, message: &[u8]) -> Result<Vec<u8>> {
        let call = MockCall::Sign {
            path: path.clone(),
            message: message.to_vec(),
        };
        match self.script.lock().next(call) {
            Response::Signature(answer) => answer.map_err(|fault| fault.into_error(path)),
            Response::PublicKey(_) => unreachable!("expectation kinds are matched by call"),
        }
    }
}

/// Scripts and inspects the [`MockDevice`]s sharing one script.
#[derive(Clone)]
pub struct MockHandle {
    class: DeviceClass,
    script: Arc<Mutex<Script>>,
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let script = self.script.lock();
        f.debug_struct("MockHandle")
            .field("class", &self.class)
            .field("remaining", &script.expectations.len())
            .field("calls", &script.calls)
            .finish()
    }
}

impl MockHandle {
    /// Creates another device sharing this script.
    #[must_use]
    pub fn device(&self) -> MockDevice {
        MockDevice {
            class: self.class,
            script: Arc::clone(&self.script),
        }
    }

    /// Returns a selector yielding a fresh device on this script per call.
    #[must_use]
    pub fn selector(&self) -> DeviceSelector {
        let handle = self.clone();
        device_selector(move || Ok(Box::new(handle.device())))
    }

    /// Expects a public key request for `path`.
    pub fn expect_get_public_key(
        &self,
        path: &DerivationPath,
        respond: std::result::Result<PublicKey, DeviceFault>,
    ) -> &Self {
        self.push(
            MockCall::GetPublicKey { path: path.clone() },
            Response::PublicKey(respond),
        )
    }

    /// Expects a signing request for `message` at `path`.
    pub fn expect_sign(
        &self,
        path: &DerivationPath,
        message: &[u8],
        respond: std::result::Result<Vec<u8>, DeviceFault>,
    ) -> &Self {
        self.push(
            MockCall::Sign {
                path: path.clone(),
                message: message.to_vec(),
            },
            Response::Signature(respond),
        )
    }

    fn push(&self, call: MockCall, response: Response) -> &Self {
        self.script
            .lock()
            .expectations
            .push_back(Expectation { call, response });
        self
    }

    /// Panics if scripted expectations were never consumed.
    pub fn assert_done(&self) {
        let script = self.script.lock();
        if !script.expectations.is_empty() {
            let pending: Vec<_> = script.expectations.iter().map(|e| &e.call).collect();
            panic!(
                "mock device: {} expectation(s) not consumed: {pending:?}",
                pending.len()
            );
        }
    }

    /// Returns every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.script.lock().calls.clone()
    }

    /// Returns the number of signing calls received so far.
    #[must_use]
    pub fn sign_calls(&self) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, MockCall::Sign { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn replays_script_in_order() {
        let key = KeyPair::generate();
        let handle = MockDevice::new(DeviceClass::EthereumApp).handle();
        let path = DerivationPath::default();
        handle
            .expect_get_public_key(&path, Ok(key.public_key().clone()))
            .expect_sign(&path, b"one", Ok(vec![1]))
            .expect_sign(&path, b"two", Err(DeviceFault::Unavailable));

        let mut device = handle.device();
        assert_eq!(&device.get_public_key(&path).unwrap(), key.public_key());
        assert_eq!(device.sign_bytes(&path, b"one").unwrap(), vec![1]);
        assert!(matches!(
            device.sign_bytes(&path, b"two"),
            Err(Error::DeviceUnavailable(_))
        ));

        handle.assert_done();
        assert_eq!(handle.sign_calls(), 2);
        assert_eq!(handle.calls()[0], MockCall::GetPublicKey { path });
    }

    #[test]
    fn faults_map_to_errors() {
        let path = DerivationPath::default();
        assert!(matches!(
            DeviceFault::InvalidPath.into_error(&path),
            Error::InvalidPath { .. }
        ));
        assert!(matches!(
            DeviceFault::SigningError.into_error(&path),
            Error::SigningError(_)
        ));
        assert!(matches!(
            DeviceFault::UserRejected.into_error(&path),
            Error::UserRejected
        ));
    }

    #[test]
    fn selector_devices_share_the_script() {
        let handle = MockDevice::new(DeviceClass::CosmosApp).handle();
        let path = DerivationPath::default();
        handle.expect_sign(&path, b"a", Ok(vec![7]));

        let selector = handle.selector();
        let mut device = selector().unwrap();
        assert_eq!(device.device_class(), DeviceClass::CosmosApp);
        assert_eq!(device.sign_bytes(&path, b"a").unwrap(), vec![7]);
        assert_eq!(handle.sign_calls(), 1);
    }

    #[test]
    #[should_panic(expected = "mismatch")]
    fn wrong_message_panics() {
        let handle = MockDevice::new(DeviceClass::CosmosApp).handle();
        let path = DerivationPath::default();
        handle.expect_sign(&path, b"expected", Ok(vec![]));
        let _ = handle.device().sign_bytes(&path, b"actual");
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exhausted_script_panics() {
        let handle = MockDevice::new(DeviceClass::CosmosApp).handle();
        let _ = handle.device().get_public_key(&DerivationPath::default());
    }

    #[test]
    #[should_panic(expected = "not consumed")]
    fn assert_done_reports_leftovers() {
        let handle = MockDevice::new(DeviceClass::CosmosApp).handle();
        handle.expect_get_public_key(&DerivationPath::default(), Err(DeviceFault::Unavailable));
        handle.assert_done();
    }
}
