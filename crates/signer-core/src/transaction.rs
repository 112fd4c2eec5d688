//! Cosmos transaction model and the signed envelope.
//!
//! This module provides the logical transaction types the encoder turns into
//! signable bytes:
//!
//! - [`Coin`] and [`Fee`]
//! - [`Msg`], the fixed set of message shapes with a canonical encoding
//! - [`TxBody`]
//! - [`SignDoc`], the immutable signing input
//! - [`SignedTx`], the assembled envelope handed to a broadcaster
//!
//! # Signing Flow
//!
//! 1. The orchestrator builds a [`SignDoc`] from a fresh [`AccountInfo`]
//! 2. [`crate::encoding::encode`] produces the preimage and digest
//! 3. The keyring signs the preimage
//! 4. [`SignedTx`] carries body, fee, signer info and signature
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::account::AccountInfo;
//! use ledger_signer_core::crypto::KeyPair;
//! use ledger_signer_core::transaction::{Coin, Fee, Msg, MsgSend, SignDoc, TxBody};
//!
//! let key = KeyPair::generate();
//! let body = TxBody::new(vec![Msg::Send(MsgSend {
//!     from_address: "evmos1from".to_string(),
//!     to_address: "evmos1to".to_string(),
//!     amount: vec![Coin::new("aevmos", 100).unwrap()],
//! })]);
//! let fee = Fee::new(vec![Coin::new("aevmos", 20).unwrap()], 200_000);
//!
//! let doc = SignDoc::new("evmos_9001-2", AccountInfo::new(7, 3), body, fee, key.public_key().clone());
//! assert_eq!(doc.account().sequence, 3);
//! ```

use alloy_primitives::{B256, keccak256};
use alloy_rlp::Encodable;
use serde::{Deserialize, Serialize};

use crate::account::AccountInfo;
use crate::crypto::PublicKey;
use crate::encoding::SignMode;
use crate::error::{Error, Result};
use crate::signature::Signature;

/// Serde helper for decimal-string amounts.
mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&amount.to_string())
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// An amount of a single denomination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    /// The denomination, e.g. `aevmos`.
    pub denom: String,

    /// The amount in the smallest unit.
    #[serde(with = "amount_string")]
    pub amount: u128,
}

impl Coin {
    /// Creates a coin, validating the denomination.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedField`] if `denom` is not a valid
    /// denomination.
    pub fn new(denom: &str, amount: u128) -> Result<Self> {
        let coin = Self {
            denom: denom.to_string(),
            amount,
        };
        coin.validate("denom")?;
        Ok(coin)
    }

    /// Checks the denomination against `[a-zA-Z][a-zA-Z0-9/:._-]{2,127}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedField`] naming `field` on failure.
    pub fn validate(&self, field: &str) -> Result<()> {
        let bytes = self.denom.as_bytes();
        let valid = (3..=128).contains(&bytes.len())
            && bytes[0].is_ascii_alphabetic()
            && bytes[1..]
                .iter()
                .all(|b| b.is_ascii_alphanumeric() || b"/:._-".contains(b));

        if valid {
            Ok(())
        } else {
            Err(Error::UnsupportedField {
                field: field.to_string(),
                reason: format!("invalid denomination {:?}", self.denom),
            })
        }
    }

    fn encode_rlp(&self, out: &mut Vec<u8>) {
        encode_rlp_list(out, |out| {
            self.denom.as_bytes().encode(out);
            self.amount.encode(out);
        });
    }
}

/// The fee paid for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// The fee amount.
    pub amount: Vec<Coin>,

    /// The gas limit.
    pub gas_limit: u64,
}

impl Fee {
    /// Creates a fee.
    #[must_use]
    pub const fn new(amount: Vec<Coin>, gas_limit: u64) -> Self {
        Self { amount, gas_limit }
    }

    fn encode_rlp(&self, out: &mut Vec<u8>) {
        encode_rlp_list(out, |out| {
            encode_coins(&self.amount, out);
            self.gas_limit.encode(out);
        });
    }
}

/// A bank transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    /// Sender address (Bech32).
    pub from_address: String,
    /// Recipient address (Bech32).
    pub to_address: String,
    /// Amount to transfer.
    pub amount: Vec<Coin>,
}

/// A staking delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDelegate {
    /// Delegator account address (Bech32).
    pub delegator_address: String,
    /// Validator operator address (Bech32).
    pub validator_address: String,
    /// Amount to delegate.
    pub amount: Coin,
}

/// A governance vote option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum VoteOption {
    /// Yes.
    Yes = 1,
    /// Abstain.
    Abstain = 2,
    /// No.
    No = 3,
    /// No with veto.
    NoWithVeto = 4,
}

impl VoteOption {
    /// Returns the protocol number of the option.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

/// A governance vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgVote {
    /// The proposal being voted on.
    pub proposal_id: u64,
    /// Voter address (Bech32).
    pub voter: String,
    /// The chosen option.
    pub option: VoteOption,
}

/// An opaque message identified only by its type URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyMsg {
    /// The protobuf type URL.
    pub type_url: String,
    /// The encoded message.
    #[serde(with = "hex_vec")]
    pub value: Vec<u8>,
}

mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(de::Error::custom)
    }
}

/// A transaction message.
///
/// Only the first three shapes have a canonical encoding; [`Msg::Any`] is
/// rejected by both encoding modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Msg {
    /// `cosmos-sdk/MsgSend`.
    #[serde(rename = "cosmos-sdk/MsgSend")]
    Send(MsgSend),
    /// `cosmos-sdk/MsgDelegate`.
    #[serde(rename = "cosmos-sdk/MsgDelegate")]
    Delegate(MsgDelegate),
    /// `cosmos-sdk/MsgVote`.
    #[serde(rename = "cosmos-sdk/MsgVote")]
    Vote(MsgVote),
    /// Anything else.
    #[serde(rename = "any")]
    Any(AnyMsg),
}

impl Msg {
    /// Returns the amino type name, or `None` for [`Msg::Any`].
    #[must_use]
    pub const fn amino_type(&self) -> Option<&'static str> {
        match self {
            Self::Send(_) => Some("cosmos-sdk/MsgSend"),
            Self::Delegate(_) => Some("cosmos-sdk/MsgDelegate"),
            Self::Vote(_) => Some("cosmos-sdk/MsgVote"),
            Self::Any(_) => None,
        }
    }

    /// Returns a short name for logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Any(any) => &any.type_url,
            other => other.amino_type().unwrap_or("unknown"),
        }
    }

    /// RLP tag of each shape.
    const fn tag(&self) -> u8 {
        match self {
            Self::Send(_) => 1,
            Self::Delegate(_) => 2,
            Self::Vote(_) => 3,
            Self::Any(_) => 0,
        }
    }

    fn check_supported(&self, field: &str) -> Result<()> {
        match self {
            Self::Send(send) => {
                for (i, coin) in send.amount.iter().enumerate() {
                    coin.validate(&format!("{field}.amount[{i}].denom"))?;
                }
                Ok(())
            }
            Self::Delegate(delegate) => delegate.amount.validate(&format!("{field}.amount.denom")),
            Self::Vote(_) => Ok(()),
            Self::Any(any) => Err(Error::UnsupportedField {
                field: field.to_string(),
                reason: format!("message type {:?} has no canonical encoding", any.type_url),
            }),
        }
    }

    fn encode_rlp(&self, out: &mut Vec<u8>) {
        encode_rlp_list(out, |out| {
            self.tag().encode(out);
            match self {
                Self::Send(send) => {
                    send.from_address.as_bytes().encode(out);
                    send.to_address.as_bytes().encode(out);
                    encode_coins(&send.amount, out);
                }
                Self::Delegate(delegate) => {
                    delegate.delegator_address.as_bytes().encode(out);
                    delegate.validator_address.as_bytes().encode(out);
                    delegate.amount.encode_rlp(out);
                }
                Self::Vote(vote) => {
                    vote.proposal_id.encode(out);
                    vote.voter.as_bytes().encode(out);
                    u64::from(vote.option.as_i32().unsigned_abs()).encode(out);
                }
                Self::Any(any) => {
                    any.type_url.as_bytes().encode(out);
                    any.value.as_slice().encode(out);
                }
            }
        });
    }
}

/// The body of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxBody {
    /// The messages, executed in order.
    pub messages: Vec<Msg>,

    /// A free-form memo.
    #[serde(default)]
    pub memo: String,

    /// Block height after which the transaction is invalid; `0` disables it.
    #[serde(default)]
    pub timeout_height: u64,
}

impl TxBody {
    /// Creates a body with an empty memo and no timeout.
    #[must_use]
    pub fn new(messages: Vec<Msg>) -> Self {
        Self {
            messages,
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

    /// Checks that every message and coin has a canonical encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedField`] naming the first offending field.
    pub fn check_supported(&self) -> Result<()> {
        for (i, msg) in self.messages.iter().enumerate() {
            msg.check_supported(&format!("body.messages[{i}]"))?;
        }
        Ok(())
    }

    /// Appends the RLP encoding of the body.
    pub fn encode_rlp(&self, out: &mut Vec<u8>) {
        encode_rlp_list(out, |out| {
            encode_rlp_list(out, |out| {
                for msg in &self.messages {
                    msg.encode_rlp(out);
                }
            });
            self.memo.as_bytes().encode(out);
            self.timeout_height.encode(out);
        });
    }
}

/// The immutable signing input.
///
/// A pure value of `(chain_id, account_number, sequence, body, fee,
/// signer_public_key)`; there is no other state an encoding can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignDoc {
    chain_id: String,
    account: AccountInfo,
    body: TxBody,
    fee: Fee,
    signer_public_key: PublicKey,
}

impl SignDoc {
    /// Creates a sign document.
    #[must_use]
    pub fn new(
        chain_id: impl Into<String>,
        account: AccountInfo,
        body: TxBody,
        fee: Fee,
        signer_public_key: PublicKey,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            account,
            body,
            fee,
            signer_public_key,
        }
    }

    /// Returns the chain identifier.
    #[must_use]
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Returns the account number and sequence.
    #[must_use]
    pub const fn account(&self) -> &AccountInfo {
        &self.account
    }

    /// Returns the body.
    #[must_use]
    pub const fn body(&self) -> &TxBody {
        &self.body
    }

    /// Returns the fee.
    #[must_use]
    pub const fn fee(&self) -> &Fee {
        &self.fee
    }

    /// Returns the signer's public key.
    #[must_use]
    pub const fn signer_public_key(&self) -> &PublicKey {
        &self.signer_public_key
    }

    /// Checks that body and fee have a canonical encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedField`] naming the first offending field.
    pub fn check_supported(&self) -> Result<()> {
        self.body.check_supported()?;
        for (i, coin) in self.fee.amount.iter().enumerate() {
            coin.validate(&format!("fee.amount[{i}].denom"))?;
        }
        Ok(())
    }

    /// Returns the RLP list
    /// `[chain_id, account_number, sequence, fee, body, signer_public_key]`.
    ///
    /// Callers must run [`SignDoc::check_supported`] first.
    #[must_use]
    pub fn rlp_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        encode_rlp_list(&mut buf, |out| {
            self.chain_id.as_bytes().encode(out);
            self.account.account_number.encode(out);
            self.account.sequence.encode(out);
            self.fee.encode_rlp(out);
            self.body.encode_rlp(out);
            self.signer_public_key.as_bytes().encode(out);
        });
        buf
    }
}

/// The signer section of an assembled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// The signer's public key.
    pub public_key: PublicKey,
    /// The signer's account address (Bech32).
    pub address: String,
    /// The sequence the signature commits to.
    pub sequence: u64,
    /// The encoding that was signed.
    pub sign_mode: SignMode,
}

/// A fully signed transaction ready for an external broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    /// The transaction body.
    pub body: TxBody,
    /// The fee.
    pub fee: Fee,
    /// Who signed, and how.
    pub signer: SignerInfo,
    /// The signature.
    pub signature: Signature,
}

impl SignedTx {
    /// Serializes the envelope as the RLP list
    /// `[body, fee, [public_key, address, sequence, sign_mode], signature]`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(512);
        encode_rlp_list(&mut buf, |out| {
            self.body.encode_rlp(out);
            self.fee.encode_rlp(out);
            encode_rlp_list(out, |out| {
                self.signer.public_key.as_bytes().encode(out);
                self.signer.address.as_bytes().encode(out);
                self.signer.sequence.encode(out);
                self.signer.sign_mode.as_u8().encode(out);
            });
            self.signature.to_bytes().as_slice().encode(out);
        });
        buf
    }

    /// Returns `keccak256(to_bytes())`.
    #[must_use]
    pub fn hash(&self) -> B256 {
        keccak256(self.to_bytes())
    }

    /// Serializes the envelope to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if parsing fails.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Encodes an RLP list using a closure to write elements.
fn encode_rlp_list<F>(out: &mut Vec<u8>, f: F)
where
    F: FnOnce(&mut Vec<u8>),
{
    let mut content = Vec::new();
    f(&mut content);

    let header = alloy_rlp::Header {
        list: true,
        payload_length: content.len(),
    };
    header.encode(out);
    out.extend_from_slice(&content);
}

fn encode_coins(coins: &[Coin], out: &mut Vec<u8>) {
    encode_rlp_list(out, |out| {
        for coin in coins {
            coin.encode_rlp(out);
        }
    });
}

#[cfg(test)]
mod tests {
    use alloy_rlp::Header;

    use super::*;
    use crate::crypto::KeyPair;

    fn send(amount: u128) -> Msg {
        Msg::Send(MsgSend {
            from_address: "evmos1from".to_string(),
            to_address: "evmos1to".to_string(),
            amount: vec![Coin::new("aevmos", amount).unwrap()],
        })
    }

    fn doc(body: TxBody) -> SignDoc {
        let key = KeyPair::from_secret_bytes(&[0x33; 32]).unwrap();
        SignDoc::new(
            "evmos_9001-2",
            AccountInfo::new(7, 3),
            body,
            Fee::new(vec![Coin::new("aevmos", 20).unwrap()], 200_000),
            key.public_key().clone(),
        )
    }

    #[test]
    fn coin_denom_validation() {
        assert!(Coin::new("aevmos", 1).is_ok());
        assert!(Coin::new("ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2", 1).is_ok());
        assert!(Coin::new("ab", 1).is_err());
        assert!(Coin::new("1atom", 1).is_err());
        assert!(Coin::new("a evmos", 1).is_err());
        assert!(Coin::new("", 1).is_err());
    }

    #[test]
    fn coin_amount_serializes_as_string() {
        let coin = Coin::new("aevmos", u128::MAX).unwrap();
        let json = serde_json::to_string(&coin).unwrap();
        assert!(json.contains(&format!("\"{}\"", u128::MAX)));
        assert_eq!(serde_json::from_str::<Coin>(&json).unwrap(), coin);
    }

    #[test]
    fn msg_json_is_amino_tagged() {
        let json = serde_json::to_value(send(5)).unwrap();
        assert_eq!(json["type"], "cosmos-sdk/MsgSend");
        assert_eq!(json["value"]["amount"][0]["amount"], "5");
    }

    #[test]
    fn any_message_is_unsupported() {
        let body = TxBody::new(vec![
            send(1),
            Msg::Any(AnyMsg {
                type_url: "/cosmos.authz.v1beta1.MsgExec".to_string(),
                value: vec![1, 2, 3],
            }),
        ]);

        let err = doc(body).check_supported().unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "body.messages[1]"));
    }

    #[test]
    fn invalid_fee_denom_is_unsupported() {
        let mut fee = Fee::new(vec![], 1);
        fee.amount.push(Coin {
            denom: "x".to_string(),
            amount: 1,
        });
        let doc = SignDoc::new(
            "evmos_9001-2",
            AccountInfo::new(0, 0),
            TxBody::new(vec![send(1)]),
            fee,
            KeyPair::generate().public_key().clone(),
        );

        let err = doc.check_supported().unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "fee.amount[0].denom"));
    }

    #[test]
    fn sign_doc_rlp_is_a_single_list() {
        let bytes = doc(TxBody::new(vec![send(100)])).rlp_bytes();
        let mut slice = bytes.as_slice();
        let header = Header::decode(&mut slice).unwrap();

        assert!(header.list);
        assert_eq!(header.payload_length, slice.len());
    }

    #[test]
    fn sign_doc_rlp_depends_on_every_field() {
        let base = doc(TxBody::new(vec![send(100)]));
        let other_amount = doc(TxBody::new(vec![send(101)]));
        let other_memo = doc(TxBody::new(vec![send(100)]).with_memo("hi"));

        assert_eq!(base.rlp_bytes(), base.clone().rlp_bytes());
        assert_ne!(base.rlp_bytes(), other_amount.rlp_bytes());
        assert_ne!(base.rlp_bytes(), other_memo.rlp_bytes());
    }

    #[test]
    fn signed_tx_json_roundtrip_and_hash() {
        let key = KeyPair::from_secret_bytes(&[0x44; 32]).unwrap();
        let tx = SignedTx {
            body: TxBody::new(vec![send(9)]),
            fee: Fee::new(vec![], 100),
            signer: SignerInfo {
                public_key: key.public_key().clone(),
                address: "evmos1signer".to_string(),
                sequence: 3,
                sign_mode: SignMode::Binary,
            },
            signature: Signature::new([1; 32], [2; 32], 0),
        };

        let recovered = SignedTx::from_json(&tx.to_json().unwrap()).unwrap();
        assert_eq!(recovered, tx);
        assert_eq!(recovered.hash(), tx.hash());
        assert_eq!(tx.hash(), keccak256(tx.to_bytes()));
    }
}
