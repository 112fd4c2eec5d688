//! Account sequencer collaborator.
//!
//! The orchestrator pulls a fresh account number and sequence from an
//! [`AccountRetriever`] for every signing session. Production clients back
//! this with a chain query; [`StaticAccountRetriever`] is the in-memory stub.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::Address;
use crate::error::{Error, Result};

/// The replay-protection state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    /// The chain-assigned account number.
    pub account_number: u64,
    /// The next unused sequence number.
    pub sequence: u64,
}

impl AccountInfo {
    /// Creates an account record.
    #[must_use]
    pub const fn new(account_number: u64, sequence: u64) -> Self {
        Self {
            account_number,
            sequence,
        }
    }
}

/// Supplies account numbers and sequences.
pub trait AccountRetriever: Send + Sync {
    /// Returns the current state of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if the chain has no such account.
    fn get_account(&self, address: &Address) -> Result<AccountInfo>;
}

/// An in-memory [`AccountRetriever`].
#[derive(Debug, Default)]
pub struct StaticAccountRetriever {
    accounts: RwLock<HashMap<Address, AccountInfo>>,
}

impl StaticAccountRetriever {
    /// Creates an empty retriever.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account, builder style.
    #[must_use]
    pub fn with_account(self, address: Address, info: AccountInfo) -> Self {
        self.set_account(address, info);
        self
    }

    /// Inserts or replaces an account.
    pub fn set_account(&self, address: Address, info: AccountInfo) {
        self.accounts.write().insert(address, info);
    }

    /// Bumps the sequence of `address`, as a chain does after inclusion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if the account is unknown.
    pub fn increment_sequence(&self, address: &Address) -> Result<u64> {
        let mut accounts = self.accounts.write();
        let info = accounts
            .get_mut(address)
            .ok_or_else(|| Error::AccountNotFound(address.to_string()))?;
        info.sequence += 1;
        Ok(info.sequence)
    }
}

impl AccountRetriever for StaticAccountRetriever {
    fn get_account(&self, address: &Address) -> Result<AccountInfo> {
        let info = self
            .accounts
            .read()
            .get(address)
            .copied()
            .ok_or_else(|| Error::AccountNotFound(address.to_string()))?;
        debug!(
            %address,
            account_number = info.account_number,
            sequence = info.sequence,
            "resolved account"
        );
        Ok(info)
    }
}
