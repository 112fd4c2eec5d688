//! The signing orchestrator.
//!
//! A signing session walks four states, strictly in order:
//!
//! | State       | Work done                                             |
//! |-------------|-------------------------------------------------------|
//! | `Built`     | account number and sequence fetched, [`SignDoc`] made |
//! | `Encoded`   | canonical sign bytes produced in the chosen mode      |
//! | `Signed`    | keyring signature obtained                            |
//! | `Assembled` | signature attached to a [`SignedTx`]                  |
//!
//! The first failure moves the session to `Failed` and is returned as is.
//! No partially built transaction ever leaves this module.
//!
//! Sessions share nothing but the keyring and the account retriever, so
//! independent sessions may run on separate threads.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use ledger_signer_core::account::{AccountInfo, StaticAccountRetriever};
//! use ledger_signer_core::config::ChainConfig;
//! use ledger_signer_core::keyring::Keyring;
//! use ledger_signer_core::orchestrator::{CancelToken, Orchestrator, TxRequest};
//! use ledger_signer_core::transaction::{Coin, Fee, Msg, MsgSend};
//!
//! let keyring = Arc::new(Keyring::in_memory());
//! let alice = keyring.create_software("alice").unwrap();
//! let accounts = Arc::new(StaticAccountRetriever::new().with_account(alice.address, AccountInfo::new(7, 3)));
//!
//! let orchestrator = Orchestrator::new(keyring, accounts, ChainConfig::default());
//! let from = orchestrator.chain().bech32().encode(&alice.address).unwrap();
//! let request = TxRequest::new(
//!     vec![Msg::Send(MsgSend {
//!         from_address: from.clone(),
//!         to_address: from,
//!         amount: vec![Coin::new("aevmos", 100).unwrap()],
//!     })],
//!     Fee::new(vec![Coin::new("aevmos", 20).unwrap()], 200_000),
//! );
//!
//! let tx = orchestrator.sign_tx("alice", request, &CancelToken::new()).unwrap();
//! assert_eq!(tx.signer.sequence, 3);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::account::AccountRetriever;
use crate::address::Address;
use crate::config::ChainConfig;
use crate::encoding::{self, SignMode};
use crate::error::{Error, Result};
use crate::keyring::Keyring;
use crate::transaction::{Fee, Msg, SignDoc, SignedTx, SignerInfo, TxBody};

/// Where a signing session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing done yet.
    Pending,
    /// The sign document exists.
    Built,
    /// The sign bytes exist.
    Encoded,
    /// The signature exists.
    Signed,
    /// The signed transaction exists.
    Assembled,
    /// A step failed.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Built => "built",
            Self::Encoded => "encoded",
            Self::Signed => "signed",
            Self::Assembled => "assembled",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Aborts a signing session from another thread.
///
/// Cancelling before the device is asked to sign stops the session without
/// side effects. Cancelling while the device works cannot interrupt it; the
/// signature it returns is discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What a caller wants signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// The messages, executed in order.
    pub messages: Vec<Msg>,
    /// The fee.
    pub fee: Fee,
    /// A free-form memo.
    pub memo: String,
    /// Block height after which the transaction is invalid; `0` disables it.
    pub timeout_height: u64,
}

impl TxRequest {
    /// Creates a request with an empty memo and no timeout.
    #[must_use]
    pub fn new(messages: Vec<Msg>, fee: Fee) -> Self {
        Self {
            messages,
            fee,
            memo: String::new(),
            timeout_height: 0,
        }
    }

    /// Sets the memo.
    #[must_use]
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }
}

struct Session<'a> {
    key: &'a str,
    state: SessionState,
    history: Vec<SessionState>,
}

impl<'a> Session<'a> {
    fn new(key: &'a str) -> Self {
        Self {
            key,
            state: SessionState::Pending,
            history: Vec::new(),
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug!(key = self.key, from = %self.state, to = %next, "signing session state change");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, error: &Error) {
        warn!(key = self.key, state = %self.state, %error, "signing session failed");
        self.state = SessionState::Failed;
        self.history.push(SessionState::Failed);
    }
}

/// Builds, encodes, signs and assembles transactions.
pub struct Orchestrator {
    keyring: Arc<Keyring>,
    accounts: Arc<dyn AccountRetriever>,
    chain: ChainConfig,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("keyring", &self.keyring)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator for `chain`.
    #[must_use]
    pub fn new(
        keyring: Arc<Keyring>,
        accounts: Arc<dyn AccountRetriever>,
        chain: ChainConfig,
    ) -> Self {
        Self {
            keyring,
            accounts,
            chain,
        }
    }

    /// Returns the chain parameters.
    #[must_use]
    pub const fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    /// Returns the keyring.
    #[must_use]
    pub const fn keyring(&self) -> &Arc<Keyring> {
        &self.keyring
    }

    /// Signs `request` with `key`, choosing the encoding the key requires.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the session:
    ///
    /// - [`Error::KeyNotFound`] or [`Error::AccountNotFound`] while building
    /// - [`Error::UnsupportedField`] or [`Error::StructuredDigestMismatch`]
    ///   while encoding
    /// - [`Error::SigningFailed`] while signing
    /// - [`Error::SignerMismatch`] while assembling
    /// - [`Error::Cancelled`] if `cancel` fired
    pub fn sign_tx(&self, key: &str, request: TxRequest, cancel: &CancelToken) -> Result<SignedTx> {
        self.session(key, request, None, cancel).1
    }

    /// Signs `request` with `key` in an explicit `mode`.
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::sign_tx`].
    pub fn sign_tx_with_mode(
        &self,
        key: &str,
        request: TxRequest,
        mode: SignMode,
        cancel: &CancelToken,
    ) -> Result<SignedTx> {
        self.session(key, request, Some(mode), cancel).1
    }

    /// Runs one session; `mode` defaults to what the key requires.
    fn session<'k>(
        &self,
        key: &'k str,
        request: TxRequest,
        mode: Option<SignMode>,
        cancel: &CancelToken,
    ) -> (Session<'k>, Result<SignedTx>) {
        let mut session = Session::new(key);
        let result = self
            .run(&mut session, request, mode, cancel)
            .inspect_err(|error| session.fail(error));
        (session, result)
    }

    fn run(
        &self,
        session: &mut Session<'_>,
        request: TxRequest,
        mode: Option<SignMode>,
        cancel: &CancelToken,
    ) -> Result<SignedTx> {
        cancel.check()?;
        let mode = match mode {
            Some(mode) => mode,
            None => self.keyring.sign_mode(session.key)?,
        };
        let bech32 = self.chain.bech32();

        let public_key = self.keyring.get_public_key(session.key)?;
        let address = Address::account(&public_key);
        let account = self.accounts.get_account(&address)?;
        let body = TxBody {
            messages: request.messages,
            memo: request.memo,
            timeout_height: request.timeout_height,
        };
        let doc = SignDoc::new(
            self.chain.chain_id.clone(),
            account,
            body,
            request.fee,
            public_key,
        );
        session.advance(SessionState::Built);

        let payload = encoding::encode(&doc, mode, &bech32)?;
        session.advance(SessionState::Encoded);

        cancel.check()?;
        let signed = self.keyring.sign(session.key, payload.preimage())?;
        if cancel.is_cancelled() {
            debug!(key = session.key, "discarding signature of cancelled session");
            return Err(Error::Cancelled);
        }
        session.advance(SessionState::Signed);

        if signed.public_key() != doc.signer_public_key() {
            return Err(Error::SignerMismatch {
                expected: doc.signer_public_key().to_hex(),
                actual: signed.public_key().to_hex(),
            });
        }
        if !signed.verify(payload.digest()) {
            return Err(Error::InvalidSignature(
                "signature does not verify over the sign bytes".to_string(),
            ));
        }

        let tx = SignedTx {
            body: doc.body().clone(),
            fee: doc.fee().clone(),
            signer: SignerInfo {
                public_key: doc.signer_public_key().clone(),
                address: bech32.encode(&address)?,
                sequence: account.sequence,
                sign_mode: mode,
            },
            signature: *signed.signature(),
        };
        session.advance(SessionState::Assembled);
        info!(
            key = session.key,
            %mode,
            sequence = account.sequence,
            tx_hash = %tx.hash(),
            "signed transaction"
        );
        Ok(tx)
    }
}
