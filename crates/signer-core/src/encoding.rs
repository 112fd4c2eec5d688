//! Canonical signing bytes for a [`SignDoc`].
//!
//! Two encodings are supported:
//!
//! - **Binary**: the RLP list
//!   `[chain_id, account_number, sequence, fee, body, signer_public_key]`.
//!   Every field is length-prefixed, so each logical transaction has exactly
//!   one encoding.
//! - **Structured**: the EIP-712 preimage
//!   `"\x19\x01" || domainSeparator || hashStruct(Tx)` over the legacy
//!   Ethermint wrapping schema, which hardware wallets can display.
//!
//! In both modes `digest = keccak256(preimage)`.
//!
//! The structured digest is computed twice: once from a JSON type table by
//! the generic [`TypedData`] hasher, and once by static encoders in this
//! module that never touch JSON. The payload is only returned if both agree.
//!
//! # Structured Schema
//!
//! ```text
//! EIP712Domain(string name,string version,uint256 chainId,string verifyingContract,string salt)
//! Tx(string account_number,string chain_id,Fee fee,string memo,Msg[] msgs,string sequence)
//! Fee(Coin[] amount,string feePayer,string gas)
//! Coin(string denom,string amount)
//! Msg(string type,MsgValue value)
//! TypeAmount(string denom,string amount)
//! ```
//!
//! `MsgValue` depends on the message shape; all messages of one payload must
//! share it.

use alloy_primitives::{B256, U256, keccak256};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::address::{Address, Bech32Config};
use crate::eip712::{self, Eip712Domain, TypedData};
use crate::error::{Error, Result};
use crate::transaction::{Coin, Msg, SignDoc};

/// Domain name of the structured schema.
pub const DOMAIN_NAME: &str = "Cosmos Web3";

/// Domain version of the structured schema.
pub const DOMAIN_VERSION: &str = "1.0.0";

/// Verifying contract of the structured schema.
pub const DOMAIN_VERIFYING_CONTRACT: &str = "cosmos";

/// Salt of the structured schema.
pub const DOMAIN_SALT: &str = "0";

/// The primary type of structured payloads.
pub const PRIMARY_TYPE: &str = "Tx";

/// Which encoding a payload uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignMode {
    /// Compact RLP encoding.
    Binary,
    /// EIP-712 structured encoding.
    Structured,
}

impl SignMode {
    /// Wire tag of the mode in a signed envelope.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Binary => 1,
            Self::Structured => 2,
        }
    }
}

impl std::fmt::Display for SignMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => f.write_str("binary"),
            Self::Structured => f.write_str("structured"),
        }
    }
}

/// The bytes to sign and their digest.
#[derive(Debug, Clone, PartialEq)]
pub struct SignPayload {
    mode: SignMode,
    preimage: Vec<u8>,
    digest: B256,
    typed_data: Option<TypedData>,
}

impl SignPayload {
    /// Returns the encoding mode.
    #[must_use]
    pub const fn mode(&self) -> SignMode {
        self.mode
    }

    /// Returns the bytes handed to the signer.
    #[must_use]
    pub fn preimage(&self) -> &[u8] {
        &self.preimage
    }

    /// Returns `keccak256(preimage)`.
    #[must_use]
    pub const fn digest(&self) -> &B256 {
        &self.digest
    }

    /// Returns the typed data shown to the user, for structured payloads.
    #[must_use]
    pub const fn typed_data(&self) -> Option<&TypedData> {
        self.typed_data.as_ref()
    }
}

/// Encodes `doc` in the requested mode.
///
/// # Errors
///
/// - [`Error::UnsupportedField`] if the document holds a value the mode
///   cannot represent
/// - [`Error::StructuredDigestMismatch`] if the two structured digests
///   disagree
pub fn encode(doc: &SignDoc, mode: SignMode, bech32: &Bech32Config) -> Result<SignPayload> {
    let payload = match mode {
        SignMode::Binary => encode_binary(doc)?,
        SignMode::Structured => encode_structured(doc, bech32)?,
    };
    debug!(
        mode = %payload.mode,
        digest = %payload.digest,
        len = payload.preimage.len(),
        "encoded sign doc"
    );
    Ok(payload)
}

/// Encodes `doc` as its RLP sign bytes.
///
/// # Errors
///
/// Returns [`Error::UnsupportedField`] for messages without a canonical
/// encoding.
pub fn encode_binary(doc: &SignDoc) -> Result<SignPayload> {
    doc.check_supported()?;
    let preimage = doc.rlp_bytes();
    Ok(SignPayload {
        mode: SignMode::Binary,
        digest: keccak256(&preimage),
        preimage,
        typed_data: None,
    })
}

/// Encodes `doc` as an EIP-712 preimage, cross-checking the schema-driven
/// and direct digests.
///
/// # Errors
///
/// - [`Error::UnsupportedField`] for unsupported messages, mixed message
///   shapes, an empty body, a timeout height, or a chain id without an
///   EIP-155 number
/// - [`Error::StructuredDigestMismatch`] if the two digests disagree
pub fn encode_structured(doc: &SignDoc, bech32: &Bech32Config) -> Result<SignPayload> {
    doc.check_supported()?;
    let schema = MsgSchema::for_messages(&doc.body().messages)?;

    if doc.body().timeout_height != 0 {
        return Err(Error::UnsupportedField {
            field: "body.timeout_height".to_string(),
            reason: "not part of the structured schema".to_string(),
        });
    }

    let eip155_chain_id =
        parse_eip155_chain_id(doc.chain_id()).map_err(|e| Error::UnsupportedField {
            field: "chain_id".to_string(),
            reason: e.to_string(),
        })?;
    let fee_payer = bech32.encode(&Address::account(doc.signer_public_key()))?;

    let typed_data = typed_data(doc, schema, eip155_chain_id, &fee_payer)?;
    let schema_preimage = typed_data.signing_preimage()?;

    let direct_preimage = eip712::signing_preimage(
        &direct::domain_separator(eip155_chain_id),
        &direct::tx_hash(doc, schema, &fee_payer),
    );

    if schema_preimage != direct_preimage {
        let schema_digest = keccak256(&schema_preimage);
        let direct_digest = keccak256(&direct_preimage);
        warn!(%schema_digest, %direct_digest, "structured digests disagree");
        return Err(Error::StructuredDigestMismatch {
            schema: schema_digest.to_string(),
            direct: direct_digest.to_string(),
        });
    }

    Ok(SignPayload {
        mode: SignMode::Structured,
        digest: keccak256(&direct_preimage),
        preimage: direct_preimage,
        typed_data: Some(typed_data),
    })
}

/// Extracts the EIP-155 chain id from a Cosmos chain id of the form
/// `<name>_<eip155>-<epoch>`.
///
/// # Errors
///
/// Returns [`Error::InvalidChainId`] if `chain_id` does not have that form.
///
/// # Example
///
/// ```
/// use ledger_signer_core::encoding::parse_eip155_chain_id;
///
/// assert_eq!(parse_eip155_chain_id("evmos_9001-2").unwrap(), 9001);
/// assert!(parse_eip155_chain_id("cosmoshub-4").is_err());
/// ```
pub fn parse_eip155_chain_id(chain_id: &str) -> Result<u64> {
    let invalid = || Error::InvalidChainId(chain_id.to_string());

    let (name, rest) = chain_id.rsplit_once('_').ok_or_else(invalid)?;
    let (number, epoch) = rest.split_once('-').ok_or_else(invalid)?;

    let is_number = |s: &str| {
        !s.is_empty() && !s.starts_with('0') && s.bytes().all(|b| b.is_ascii_digit())
    };

    if name.is_empty()
        || !name.bytes().all(|b| b.is_ascii_lowercase())
        || !is_number(number)
        || !is_number(epoch)
    {
        return Err(invalid());
    }

    number.parse().map_err(|_| invalid())
}

/// The `MsgValue` shape shared by every message of a structured payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MsgSchema {
    Send,
    Delegate,
    Vote,
}

impl MsgSchema {
    fn of(msg: &Msg) -> Option<Self> {
        match msg {
            Msg::Send(_) => Some(Self::Send),
            Msg::Delegate(_) => Some(Self::Delegate),
            Msg::Vote(_) => Some(Self::Vote),
            Msg::Any(_) => None,
        }
    }

    fn for_messages(messages: &[Msg]) -> Result<Self> {
        let first = messages.first().ok_or_else(|| Error::UnsupportedField {
            field: "body.messages".to_string(),
            reason: "structured payloads need at least one message".to_string(),
        })?;

        let unsupported = |i: usize| Error::UnsupportedField {
            field: format!("body.messages[{i}]"),
            reason: "structured payloads carry a single message type".to_string(),
        };

        let schema = Self::of(first).ok_or_else(|| unsupported(0))?;
        for (i, msg) in messages.iter().enumerate().skip(1) {
            if Self::of(msg) != Some(schema) {
                return Err(unsupported(i));
            }
        }
        Ok(schema)
    }

    /// `MsgValue` fields as `(name, type)`.
    const fn fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Send => &[
                ("from_address", "string"),
                ("to_address", "string"),
                ("amount", "TypeAmount[]"),
            ],
            Self::Delegate => &[
                ("delegator_address", "string"),
                ("validator_address", "string"),
                ("amount", "TypeAmount"),
            ],
            Self::Vote => &[
                ("proposal_id", "uint64"),
                ("voter", "string"),
                ("option", "int32"),
            ],
        }
    }

    const fn uses_type_amount(self) -> bool {
        matches!(self, Self::Send | Self::Delegate)
    }
}

fn fields_json(fields: &[(&str, &str)]) -> Value {
    Value::Array(
        fields
            .iter()
            .map(|(name, ty)| json!({"name": name, "type": ty}))
            .collect(),
    )
}

fn coin_json(coin: &Coin) -> Value {
    json!({"denom": coin.denom, "amount": coin.amount.to_string()})
}

fn msg_json(msg: &Msg) -> Value {
    let value = match msg {
        Msg::Send(send) => json!({
            "from_address": send.from_address,
            "to_address": send.to_address,
            "amount": send.amount.iter().map(coin_json).collect::<Vec<_>>(),
        }),
        Msg::Delegate(delegate) => json!({
            "delegator_address": delegate.delegator_address,
            "validator_address": delegate.validator_address,
            "amount": coin_json(&delegate.amount),
        }),
        Msg::Vote(vote) => json!({
            "proposal_id": vote.proposal_id,
            "voter": vote.voter,
            "option": vote.option.as_i32(),
        }),
        Msg::Any(_) => Value::Null,
    };
    json!({"type": msg.amino_type().unwrap_or_default(), "value": value})
}

/// Builds the schema-driven representation shown to the user.
fn typed_data(
    doc: &SignDoc,
    schema: MsgSchema,
    eip155_chain_id: u64,
    fee_payer: &str,
) -> Result<TypedData> {
    let mut types = json!({
        "EIP712Domain": fields_json(&[
            ("name", "string"),
            ("version", "string"),
            ("chainId", "uint256"),
            ("verifyingContract", "string"),
            ("salt", "string"),
        ]),
        "Tx": fields_json(&[
            ("account_number", "string"),
            ("chain_id", "string"),
            ("fee", "Fee"),
            ("memo", "string"),
            ("msgs", "Msg[]"),
            ("sequence", "string"),
        ]),
        "Fee": fields_json(&[("amount", "Coin[]"), ("feePayer", "string"), ("gas", "string")]),
        "Coin": fields_json(&[("denom", "string"), ("amount", "string")]),
        "Msg": fields_json(&[("type", "string"), ("value", "MsgValue")]),
        "MsgValue": fields_json(schema.fields()),
    });
    if schema.uses_type_amount()
        && let Some(map) = types.as_object_mut()
    {
        map.insert(
            "TypeAmount".to_string(),
            fields_json(&[("denom", "string"), ("amount", "string")]),
        );
    }

    let message = json!({
        "account_number": doc.account().account_number.to_string(),
        "chain_id": doc.chain_id(),
        "fee": {
            "amount": doc.fee().amount.iter().map(coin_json).collect::<Vec<_>>(),
            "feePayer": fee_payer,
            "gas": doc.fee().gas_limit.to_string(),
        },
        "memo": doc.body().memo,
        "msgs": doc.body().messages.iter().map(msg_json).collect::<Vec<_>>(),
        "sequence": doc.account().sequence.to_string(),
    });

    let domain = Eip712Domain {
        name: Some(DOMAIN_NAME.to_string()),
        version: Some(DOMAIN_VERSION.to_string()),
        chain_id: Some(eip155_chain_id),
        verifying_contract: Some(DOMAIN_VERIFYING_CONTRACT.to_string()),
        salt: Some(DOMAIN_SALT.to_string()),
    };

    TypedData::new(domain, types, PRIMARY_TYPE, message)
}

/// Static struct encoders for the structured schema.
mod direct {
    use super::*;

    const DOMAIN_TYPE: &str = "EIP712Domain(string name,string version,uint256 chainId,string verifyingContract,string salt)";
    const TX_TYPE: &str =
        "Tx(string account_number,string chain_id,Fee fee,string memo,Msg[] msgs,string sequence)";
    const FEE_TYPE: &str = "Fee(Coin[] amount,string feePayer,string gas)";
    const COIN_TYPE: &str = "Coin(string denom,string amount)";
    const MSG_TYPE: &str = "Msg(string type,MsgValue value)";
    const TYPE_AMOUNT_TYPE: &str = "TypeAmount(string denom,string amount)";
    const SEND_VALUE_TYPE: &str =
        "MsgValue(string from_address,string to_address,TypeAmount[] amount)";
    const DELEGATE_VALUE_TYPE: &str =
        "MsgValue(string delegator_address,string validator_address,TypeAmount amount)";
    const VOTE_VALUE_TYPE: &str = "MsgValue(uint64 proposal_id,string voter,int32 option)";

    fn msg_value_type(schema: MsgSchema) -> String {
        match schema {
            MsgSchema::Send => format!("{SEND_VALUE_TYPE}{TYPE_AMOUNT_TYPE}"),
            MsgSchema::Delegate => format!("{DELEGATE_VALUE_TYPE}{TYPE_AMOUNT_TYPE}"),
            MsgSchema::Vote => VOTE_VALUE_TYPE.to_string(),
        }
    }

    fn hash_struct(type_string: &str, words: &[B256]) -> B256 {
        let mut buf = Vec::with_capacity(32 * (words.len() + 1));
        buf.extend_from_slice(keccak256(type_string.as_bytes()).as_slice());
        for word in words {
            buf.extend_from_slice(word.as_slice());
        }
        keccak256(&buf)
    }

    fn hash_array(items: impl IntoIterator<Item = B256>) -> B256 {
        let mut buf = Vec::new();
        for item in items {
            buf.extend_from_slice(item.as_slice());
        }
        keccak256(&buf)
    }

    fn string(s: &str) -> B256 {
        keccak256(s.as_bytes())
    }

    fn uint(n: u64) -> B256 {
        B256::from(U256::from(n).to_be_bytes::<32>())
    }

    fn coin(type_string: &str, coin: &Coin) -> B256 {
        hash_struct(
            type_string,
            &[string(&coin.denom), string(&coin.amount.to_string())],
        )
    }

    fn msg_value(msg: &Msg, schema: MsgSchema) -> B256 {
        let type_string = msg_value_type(schema);
        match msg {
            Msg::Send(send) => hash_struct(
                &type_string,
                &[
                    string(&send.from_address),
                    string(&send.to_address),
                    hash_array(send.amount.iter().map(|c| coin(TYPE_AMOUNT_TYPE, c))),
                ],
            ),
            Msg::Delegate(delegate) => hash_struct(
                &type_string,
                &[
                    string(&delegate.delegator_address),
                    string(&delegate.validator_address),
                    coin(TYPE_AMOUNT_TYPE, &delegate.amount),
                ],
            ),
            Msg::Vote(vote) => hash_struct(
                &type_string,
                &[
                    uint(vote.proposal_id),
                    string(&vote.voter),
                    uint(u64::from(vote.option.as_i32().unsigned_abs())),
                ],
            ),
            Msg::Any(_) => B256::ZERO,
        }
    }

    fn msg(msg: &Msg, schema: MsgSchema) -> B256 {
        let type_string = format!("{MSG_TYPE}{}", msg_value_type(schema));
        hash_struct(
            &type_string,
            &[
                string(msg.amino_type().unwrap_or_default()),
                msg_value(msg, schema),
            ],
        )
    }

    pub(super) fn domain_separator(eip155_chain_id: u64) -> B256 {
        hash_struct(
            DOMAIN_TYPE,
            &[
                string(DOMAIN_NAME),
                string(DOMAIN_VERSION),
                uint(eip155_chain_id),
                string(DOMAIN_VERIFYING_CONTRACT),
                string(DOMAIN_SALT),
            ],
        )
    }

    pub(super) fn tx_hash(doc: &SignDoc, schema: MsgSchema, fee_payer: &str) -> B256 {
        let fee_type = format!("{FEE_TYPE}{COIN_TYPE}");
        let fee = hash_struct(
            &fee_type,
            &[
                hash_array(doc.fee().amount.iter().map(|c| coin(COIN_TYPE, c))),
                string(fee_payer),
                string(&doc.fee().gas_limit.to_string()),
            ],
        );

        // Dependencies sorted by name: Coin, Fee, Msg, MsgValue, TypeAmount.
        let tx_type = format!(
            "{TX_TYPE}{COIN_TYPE}{FEE_TYPE}{MSG_TYPE}{}",
            msg_value_type(schema)
        );
        hash_struct(
            &tx_type,
            &[
                string(&doc.account().account_number.to_string()),
                string(doc.chain_id()),
                fee,
                string(&doc.body().memo),
                hash_array(doc.body().messages.iter().map(|m| msg(m, schema))),
                string(&doc.account().sequence.to_string()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::account::AccountInfo;
    use crate::crypto::{KeyPair, verify_signature};
    use crate::transaction::{AnyMsg, Fee, MsgDelegate, MsgSend, MsgVote, TxBody, VoteOption};

    fn key() -> KeyPair {
        KeyPair::from_secret_bytes(&[0x55; 32]).unwrap()
    }

    fn send(amount: u128) -> Msg {
        Msg::Send(MsgSend {
            from_address: "evmos1from".to_string(),
            to_address: "evmos1to".to_string(),
            amount: vec![Coin::new("aevmos", amount).unwrap()],
        })
    }

    fn vote(option: VoteOption) -> Msg {
        Msg::Vote(MsgVote {
            proposal_id: 12,
            voter: "evmos1voter".to_string(),
            option,
        })
    }

    fn doc_with(chain_id: &str, body: TxBody) -> SignDoc {
        SignDoc::new(
            chain_id,
            AccountInfo::new(7, 3),
            body,
            Fee::new(vec![Coin::new("aevmos", 4_000_000_000_000_000).unwrap()], 200_000),
            key().public_key().clone(),
        )
    }

    fn doc(messages: Vec<Msg>) -> SignDoc {
        doc_with("evmos_9001-2", TxBody::new(messages).with_memo("memo"))
    }

    #[test]
    fn parse_chain_ids() {
        assert_eq!(parse_eip155_chain_id("evmos_9001-2").unwrap(), 9001);
        assert_eq!(parse_eip155_chain_id("evmos_9000-13").unwrap(), 9000);
        assert_eq!(parse_eip155_chain_id("ethermint_9000-1").unwrap(), 9000);

        for bad in ["cosmoshub-4", "evmos_9001", "evmos_09001-1", "Evmos_9001-1", "_9001-1", "evmos_x-1"] {
            assert!(
                matches!(parse_eip155_chain_id(bad), Err(Error::InvalidChainId(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn binary_payload() {
        let doc = doc(vec![send(100)]);
        let payload = encode(&doc, SignMode::Binary, &Bech32Config::default()).unwrap();

        assert_eq!(payload.mode(), SignMode::Binary);
        assert_eq!(payload.preimage(), doc.rlp_bytes().as_slice());
        assert_eq!(payload.digest(), &keccak256(payload.preimage()));
        assert!(payload.typed_data().is_none());
    }

    #[test]
    fn structured_payload_for_every_message_shape() {
        let delegate = Msg::Delegate(MsgDelegate {
            delegator_address: "evmos1delegator".to_string(),
            validator_address: "evmosvaloper1validator".to_string(),
            amount: Coin::new("aevmos", 1_000).unwrap(),
        });

        for messages in [
            vec![send(100)],
            vec![send(1), send(2), send(3)],
            vec![delegate],
            vec![vote(VoteOption::Yes), vote(VoteOption::NoWithVeto)],
        ] {
            let payload = encode(&doc(messages), SignMode::Structured, &Bech32Config::default()).unwrap();

            let preimage = payload.preimage();
            assert_eq!(preimage.len(), 66);
            assert_eq!(&preimage[..2], &[0x19, 0x01]);
            assert_eq!(payload.digest(), &keccak256(preimage));

            let typed = payload.typed_data().unwrap();
            assert_eq!(&typed.signing_hash().unwrap(), payload.digest());
        }
    }

    #[test]
    fn structured_type_string_matches_schema() {
        let payload = encode(&doc(vec![send(1)]), SignMode::Structured, &Bech32Config::default()).unwrap();
        let typed = payload.typed_data().unwrap();

        assert_eq!(
            typed.encode_type("Tx").unwrap(),
            "Tx(string account_number,string chain_id,Fee fee,string memo,Msg[] msgs,string sequence)\
             Coin(string denom,string amount)\
             Fee(Coin[] amount,string feePayer,string gas)\
             Msg(string type,MsgValue value)\
             MsgValue(string from_address,string to_address,TypeAmount[] amount)\
             TypeAmount(string denom,string amount)"
        );
        assert_eq!(typed.message["fee"]["feePayer"], json!(
            Bech32Config::default().encode(&Address::account(key().public_key())).unwrap()
        ));
        assert_eq!(typed.message["sequence"], "3");
        assert_eq!(typed.domain.chain_id, Some(9001));
    }

    #[test]
    fn structured_rejects_mixed_shapes() {
        let err = encode(
            &doc(vec![send(1), vote(VoteOption::No)]),
            SignMode::Structured,
            &Bech32Config::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "body.messages[1]"));

        // The binary encoding has no such restriction.
        assert!(encode(&doc(vec![send(1), vote(VoteOption::No)]), SignMode::Binary, &Bech32Config::default()).is_ok());
    }

    #[test]
    fn structured_rejects_empty_body() {
        let err = encode(&doc(vec![]), SignMode::Structured, &Bech32Config::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "body.messages"));
    }

    #[test]
    fn structured_rejects_chain_without_eip155_id() {
        let doc = doc_with("cosmoshub-4", TxBody::new(vec![send(1)]));
        let err = encode(&doc, SignMode::Structured, &Bech32Config::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "chain_id"));
    }

    #[test]
    fn structured_rejects_timeout_height() {
        let mut body = TxBody::new(vec![send(1)]);
        body.timeout_height = 100;
        let err = encode(&doc_with("evmos_9001-2", body), SignMode::Structured, &Bech32Config::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { ref field, .. } if field == "body.timeout_height"));
    }

    #[test]
    fn any_message_is_rejected_in_both_modes() {
        let any = Msg::Any(AnyMsg {
            type_url: "/ethermint.evm.v1.MsgEthereumTx".to_string(),
            value: vec![0xde, 0xad],
        });
        for mode in [SignMode::Binary, SignMode::Structured] {
            let err = encode(&doc(vec![any.clone()]), mode, &Bech32Config::default()).unwrap_err();
            assert!(matches!(err, Error::UnsupportedField { .. }), "{mode}");
        }
    }

    #[test]
    fn both_modes_verify_against_the_same_key() {
        let key = key();
        let doc = doc(vec![send(100)]);
        let codec = Bech32Config::default();

        let binary = encode(&doc, SignMode::Binary, &codec).unwrap();
        let structured = encode(&doc, SignMode::Structured, &codec).unwrap();
        assert_ne!(binary.digest(), structured.digest());

        for payload in [binary, structured] {
            let sig = key.sign_digest(payload.digest()).unwrap();
            assert!(verify_signature(payload.digest(), &sig, key.public_key()));
        }
    }

    #[test]
    fn digest_depends_on_chain() {
        let a = encode(&doc_with("evmos_9001-2", TxBody::new(vec![send(1)])), SignMode::Structured, &Bech32Config::default()).unwrap();
        let b = encode(&doc_with("evmos_9000-4", TxBody::new(vec![send(1)])), SignMode::Structured, &Bech32Config::default()).unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    proptest! {
        #[test]
        fn encoding_is_deterministic(
            amount in any::<u128>(),
            account_number in any::<u64>(),
            sequence in any::<u64>(),
            memo in "[ -~]{0,32}",
        ) {
            let build = || SignDoc::new(
                "evmos_9001-2",
                AccountInfo::new(account_number, sequence),
                TxBody::new(vec![send(amount)]).with_memo(memo.clone()),
                Fee::new(vec![], 21_000),
                key().public_key().clone(),
            );
            let codec = Bech32Config::default();

            for mode in [SignMode::Binary, SignMode::Structured] {
                let first = encode(&build(), mode, &codec).unwrap();
                let second = encode(&build(), mode, &codec).unwrap();
                prop_assert_eq!(first.preimage(), second.preimage());
                prop_assert_eq!(first.digest(), second.digest());
            }
        }
    }
}
