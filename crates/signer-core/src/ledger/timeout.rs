//! Bounding device calls with a timeout.
//!
//! [`TimeoutDevice`] moves the wrapped device onto a dedicated worker
//! thread. Each call is sent to the worker with its own reply channel and
//! the caller waits at most the configured duration. On expiry the call
//! fails with [`Error::DeviceUnavailable`]; when the device eventually
//! answers, the reply is dropped.
//!
//! Requests are served one at a time in submission order, so a device that
//! is stuck on a timed-out request also delays the requests behind it.
//!
//! A panic inside the device (a [`MockDevice`](super::mock::MockDevice)
//! script mismatch, for instance) is carried back and resumed on the
//! calling thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{DerivationPath, DeviceClass, HardwareDevice};
use crate::crypto::PublicKey;
use crate::error::{Error, Result};

/// A device answer, or the payload of the panic that replaced it.
type Reply<T> = thread::Result<Result<T>>;

enum Job {
    GetPublicKey {
        path: DerivationPath,
        reply: Sender<Reply<PublicKey>>,
    },
    Sign {
        path: DerivationPath,
        message: Vec<u8>,
        reply: Sender<Reply<Vec<u8>>>,
    },
}

/// A [`HardwareDevice`] whose calls fail with
/// [`Error::DeviceUnavailable`] after a timeout.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use ledger_signer_core::ledger::mock::MockDevice;
/// use ledger_signer_core::ledger::{DeviceClass, HardwareDevice, TimeoutDevice};
///
/// let handle = MockDevice::new(DeviceClass::CosmosApp).handle();
/// let device = TimeoutDevice::new(Box::new(handle.device()), Duration::from_secs(5)).unwrap();
/// assert_eq!(device.device_class(), DeviceClass::CosmosApp);
/// ```
#[derive(Debug)]
pub struct TimeoutDevice {
    class: DeviceClass,
    timeout: Duration,
    jobs: Sender<Job>,
}

impl TimeoutDevice {
    /// Spawns the worker thread that owns `device`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn new(device: Box<dyn HardwareDevice>, timeout: Duration) -> Result<Self> {
        let class = device.device_class();
        let (jobs, queue) = mpsc::channel();

        thread::Builder::new()
            .name("ledger-device".to_string())
            .spawn(move || serve(device, &queue))?;

        Ok(Self {
            class,
            timeout,
            jobs,
        })
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn call<T>(&self, job: Job, reply: &Receiver<Reply<T>>) -> Result<T> {
        self.jobs
            .send(job)
            .map_err(|_| Error::DeviceUnavailable("device worker has stopped".to_string()))?;

        match reply.recv_timeout(self.timeout) {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = self.timeout.as_millis(), "device call timed out");
                Err(Error::DeviceUnavailable(format!(
                    "no answer within {} ms",
                    self.timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::DeviceUnavailable(
                "device worker dropped the request".to_string(),
            )),
        }
    }
}

impl HardwareDevice for TimeoutDevice {
    fn device_class(&self) -> DeviceClass {
        self.class
    }

    fn get_public_key(&mut self, path: &DerivationPath) -> Result<PublicKey> {
        let (reply, rx) = mpsc::channel();
        let job = Job::GetPublicKey {
            path: path.clone(),
            reply,
        };
        self.call(job, &rx)
    }

    fn sign_bytes(&mut self, path: &DerivationPath, message: &[u8]) -> Result<Vec<u8>> {
        let (reply, rx) = mpsc::channel();
        let job = Job::Sign {
            path: path.clone(),
            message: message.to_vec(),
            reply,
        };
        self.call(job, &rx)
    }
}

fn serve(mut device: Box<dyn HardwareDevice>, queue: &Receiver<Job>) {
    debug!(class = %device.device_class(), "device worker started");
    while let Ok(job) = queue.recv() {
        let delivered = match job {
            Job::GetPublicKey { path, reply } => reply
                .send(panic::catch_unwind(AssertUnwindSafe(|| {
                    device.get_public_key(&path)
                })))
                .is_ok(),
            Job::Sign {
                path,
                message,
                reply,
            } => reply
                .send(panic::catch_unwind(AssertUnwindSafe(|| {
                    device.sign_bytes(&path, &message)
                })))
                .is_ok(),
        };
        if !delivered {
            trace!("discarding late device answer");
        }
    }
    debug!("device worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::crypto::KeyPair;
    use crate::ledger::mock::{DeviceFault, MockDevice};

    /// Sleeps before answering.
    struct SlowDevice {
        delay: Duration,
        calls: Arc<AtomicUsize>,
        key: KeyPair,
    }

    impl HardwareDevice for SlowDevice {
        fn device_class(&self) -> DeviceClass {
            DeviceClass::CosmosApp
        }

        fn get_public_key(&mut self, _path: &DerivationPath) -> Result<PublicKey> {
            thread::sleep(self.delay);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.key.public_key().clone())
        }

        fn sign_bytes(&mut self, _path: &DerivationPath, _message: &[u8]) -> Result<Vec<u8>> {
            thread::sleep(self.delay);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0; 65])
        }
    }

    #[test]
    fn forwards_answers_within_timeout() {
        let key = KeyPair::generate();
        let handle = MockDevice::new(DeviceClass::EthereumApp).handle();
        let path = DerivationPath::default();
        handle.expect_get_public_key(&path, Ok(key.public_key().clone()));
        handle.expect_sign(&path, b"payload", Err(DeviceFault::UserRejected));

        let mut device =
            TimeoutDevice::new(Box::new(handle.device()), Duration::from_secs(5)).unwrap();
        assert_eq!(device.device_class(), DeviceClass::EthereumApp);
        assert_eq!(&device.get_public_key(&path).unwrap(), key.public_key());
        assert!(matches!(
            device.sign_bytes(&path, b"payload"),
            Err(Error::UserRejected)
        ));
        handle.assert_done();
    }

    #[test]
    fn slow_device_times_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = SlowDevice {
            delay: Duration::from_millis(300),
            calls: Arc::clone(&calls),
            key: KeyPair::generate(),
        };

        let mut device = TimeoutDevice::new(Box::new(slow), Duration::from_millis(20)).unwrap();
        let err = device
            .sign_bytes(&DerivationPath::default(), b"payload")
            .unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
        assert!(err.is_retryable());

        // The device still finishes; its answer goes nowhere.
        thread::sleep(Duration::from_millis(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "mismatch")]
    fn device_panic_reaches_the_caller() {
        let path = DerivationPath::default();
        let handle = MockDevice::new(DeviceClass::CosmosApp).handle();
        handle.expect_sign(&path, b"expected", Ok(vec![0; 70]));

        let mut device =
            TimeoutDevice::new(Box::new(handle.device()), Duration::from_secs(5)).unwrap();
        let _ = device.sign_bytes(&path, b"something else");
    }

    #[test]
    fn worker_keeps_serving_after_a_panic() {
        let key = KeyPair::generate();
        let path = DerivationPath::default();
        let handle = MockDevice::new(DeviceClass::CosmosApp).handle();
        handle.expect_sign(&path, b"expected", Ok(vec![0; 70]));

        let mut device =
            TimeoutDevice::new(Box::new(handle.device()), Duration::from_secs(5)).unwrap();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            device.sign_bytes(&path, b"something else")
        }));
        assert!(caught.is_err());

        handle.expect_get_public_key(&path, Ok(key.public_key().clone()));
        assert_eq!(&device.get_public_key(&path).unwrap(), key.public_key());
    }
}
