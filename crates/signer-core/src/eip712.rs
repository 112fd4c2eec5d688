//! EIP-712 hashing of schema-described documents.
//!
//! This module implements [EIP-712] for hashing typed structured data. It is
//! the schema-driven half of the structured sign mode: a [`TypedData`]
//! document carries its own type table, so any message shape described in
//! JSON can be hashed and shown to a wallet for review.
//!
//! # Hash Computation
//!
//! ```text
//! preimage = "\x19\x01" || domainSeparator || hashStruct(message)
//! digest   = keccak256(preimage)
//! ```
//!
//! The domain separator is `hashStruct("EIP712Domain", domain)`. When the
//! type table defines `EIP712Domain` that definition is used verbatim, which
//! is how chains that declare `verifyingContract` or `salt` as `string`
//! produce their separators. Otherwise the standard domain type is derived
//! from the fields that are present.
//!
//! # Example
//!
//! ```
//! use ledger_signer_core::eip712::{Eip712Domain, TypedData};
//! use serde_json::json;
//!
//! let domain = Eip712Domain {
//!     name: Some("Cosmos Web3".to_string()),
//!     version: Some("1.0.0".to_string()),
//!     chain_id: Some(9001),
//!     verifying_contract: Some("cosmos".to_string()),
//!     salt: Some("0".to_string()),
//! };
//! let types = json!({
//!     "EIP712Domain": [
//!         {"name": "name", "type": "string"},
//!         {"name": "version", "type": "string"},
//!         {"name": "chainId", "type": "uint256"},
//!         {"name": "verifyingContract", "type": "string"},
//!         {"name": "salt", "type": "string"}
//!     ],
//!     "Coin": [
//!         {"name": "denom", "type": "string"},
//!         {"name": "amount", "type": "string"}
//!     ],
//!     "Grant": [
//!         {"name": "grantee", "type": "string"},
//!         {"name": "limit", "type": "Coin[]"}
//!     ]
//! });
//! let message = json!({
//!     "grantee": "evmos1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqkp8ddk",
//!     "limit": [{"denom": "aevmos", "amount": "100"}]
//! });
//!
//! let grant = TypedData::new(domain, types, "Grant", message).unwrap();
//! assert_eq!(grant.encode_type("Grant").unwrap(), "Grant(string grantee,Coin[] limit)Coin(string denom,string amount)");
//! assert_eq!(grant.signing_preimage().unwrap().len(), 66);
//! ```
//!
//! [EIP-712]: https://eips.ethereum.org/EIPS/eip-712

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{Address as AlloyAddress, B256, U256, keccak256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The name of the domain struct type.
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// Domain parameters; absent fields are left out of the standard domain type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    /// Application name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// EIP-155 chain id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// The verifying contract. Standard domains use an address; some chains
    /// use a free-form string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<String>,

    /// A disambiguating salt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl Eip712Domain {
    /// Returns the standard `EIP712Domain` field list for the fields that
    /// are present, in canonical order.
    #[must_use]
    pub fn standard_fields(&self) -> Vec<TypeField> {
        let mut fields = Vec::with_capacity(5);
        if self.name.is_some() {
            fields.push(TypeField::new("name", "string"));
        }
        if self.version.is_some() {
            fields.push(TypeField::new("version", "string"));
        }
        if self.chain_id.is_some() {
            fields.push(TypeField::new("chainId", "uint256"));
        }
        if self.verifying_contract.is_some() {
            fields.push(TypeField::new("verifyingContract", "address"));
        }
        if self.salt.is_some() {
            fields.push(TypeField::new("salt", "bytes32"));
        }
        fields
    }
}

/// One `{name, type}` entry of a struct definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
    pub name: String,

    /// The type of the field (e.g., "string", "uint256", "Coin[]").
    #[serde(rename = "type")]
    pub field_type: String,
}

impl TypeField {
    /// Creates a field definition.
    #[must_use]
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
        }
    }
}

/// A self-describing EIP-712 document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// The type definitions, keyed by type name.
    pub types: BTreeMap<String, Vec<TypeField>>,

    /// Root struct of `message`.
    pub primary_type: String,

    /// The EIP-712 domain.
    pub domain: Eip712Domain,

    /// The message data.
    pub message: Value,
}

impl TypedData {
    /// Creates a typed data document from a JSON type table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTypedData`] if `types` is not an object of
    /// field lists.
    pub fn new(
        domain: Eip712Domain,
        types: Value,
        primary_type: impl Into<String>,
        message: Value,
    ) -> Result<Self> {
        let types: BTreeMap<String, Vec<TypeField>> = serde_json::from_value(types)
            .map_err(|e| Error::InvalidTypedData(format!("malformed type table: {e}")))?;
        Ok(Self {
            types,
            primary_type: primary_type.into(),
            domain,
            message,
        })
    }

    /// Computes the domain separator.
    ///
    /// # Errors
    ///
    /// Returns an error if the domain does not match its type definition.
    pub fn domain_separator(&self) -> Result<B256> {
        let domain = serde_json::to_value(&self.domain)?;
        let fields = match self.types.get(DOMAIN_TYPE) {
            Some(fields) => fields.clone(),
            None => self.domain.standard_fields(),
        };

        let type_hash = keccak256(format_type(DOMAIN_TYPE, &fields).as_bytes());
        let encoded = self.encode_fields(&fields, &domain)?;
        Ok(hash_with_type(type_hash, &encoded))
    }

    /// Computes `hashStruct(message)` for the primary type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedType`] or [`Error::InvalidTypedData`] if the
    /// message does not match the type table.
    pub fn struct_hash(&self) -> Result<B256> {
        self.hash_struct(&self.primary_type, &self.message)
    }

    /// Returns the 66-byte signing preimage
    /// `"\x19\x01" || domainSeparator || hashStruct(message)`.
    ///
    /// # Errors
    ///
    /// Same as [`TypedData::struct_hash`].
    pub fn signing_preimage(&self) -> Result<Vec<u8>> {
        let domain_separator = self.domain_separator()?;
        let struct_hash = self.struct_hash()?;
        Ok(signing_preimage(&domain_separator, &struct_hash))
    }

    /// Computes the signing hash for this typed data.
    ///
    /// # Errors
    ///
    /// Same as [`TypedData::struct_hash`].
    pub fn signing_hash(&self) -> Result<B256> {
        Ok(keccak256(self.signing_preimage()?))
    }

    /// Computes `keccak256(typeHash || encodeData(data))` for `type_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedType`] if `type_name` or a type it
    /// references is missing, and [`Error::InvalidTypedData`] if `data`
    /// does not match.
    pub fn hash_struct(&self, type_name: &str, data: &Value) -> Result<B256> {
        let type_hash = self.type_hash(type_name)?;
        let encoded = self.encode_fields(self.fields(type_name)?, data)?;
        Ok(hash_with_type(type_hash, &encoded))
    }

    /// Computes `keccak256(encodeType(type_name))`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedType`] if a type is missing.
    pub fn type_hash(&self, type_name: &str) -> Result<B256> {
        Ok(keccak256(self.encode_type(type_name)?.as_bytes()))
    }

    /// Encodes the type string: the type itself followed by every type it
    /// references, directly or transitively, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedType`] if a type is missing.
    pub fn encode_type(&self, type_name: &str) -> Result<String> {
        let mut dependencies = BTreeSet::new();
        self.collect_dependencies(type_name, &mut dependencies)?;
        dependencies.remove(type_name);

        let mut result = format_type(type_name, self.fields(type_name)?);
        for dependency in &dependencies {
            result.push_str(&format_type(dependency, self.fields(dependency)?));
        }
        Ok(result)
    }

    fn collect_dependencies(&self, type_name: &str, found: &mut BTreeSet<String>) -> Result<()> {
        if found.contains(type_name) {
            return Ok(());
        }
        let fields = self.fields(type_name)?;
        found.insert(type_name.to_string());

        for field in fields {
            if let Some(referenced) = self.referenced_type(&field.field_type) {
                self.collect_dependencies(referenced, found)?;
            }
        }
        Ok(())
    }

    fn fields(&self, type_name: &str) -> Result<&[TypeField]> {
        self.types
            .get(type_name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UndefinedType(type_name.to_string()))
    }

    fn referenced_type<'a>(&self, field_type: &'a str) -> Option<&'a str> {
        let base_type = field_type.strip_suffix("[]").unwrap_or(field_type);
        self.types.contains_key(base_type).then_some(base_type)
    }

    fn encode_fields(&self, fields: &[TypeField], data: &Value) -> Result<Vec<u8>> {
        let object = data
            .as_object()
            .ok_or_else(|| Error::InvalidTypedData(format!("{data} is not a struct")))?;

        let mut encoded = Vec::with_capacity(32 * fields.len());
        for field in fields {
            let value = object.get(&field.name).ok_or_else(|| {
                Error::InvalidTypedData(format!("field {:?} is missing", field.name))
            })?;
            encoded.extend_from_slice(self.encode_value(&field.field_type, value)?.as_slice());
        }
        Ok(encoded)
    }

    fn encode_value(&self, field_type: &str, value: &Value) -> Result<B256> {
        if let Some(item_type) = field_type.strip_suffix("[]") {
            let items = value
                .as_array()
                .ok_or_else(|| mismatch(field_type, value))?;
            let mut words = Vec::with_capacity(32 * items.len());
            for item in items {
                words.extend_from_slice(self.encode_value(item_type, item)?.as_slice());
            }
            return Ok(keccak256(&words));
        }

        if self.types.contains_key(field_type) {
            self.hash_struct(field_type, value)
        } else {
            encode_atomic(field_type, value)
        }
    }

    /// Parses a `{types, primaryType, domain, message}` document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the document in the `eth_signTypedData_v4` layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Builds `"\x19\x01" || domain_separator || struct_hash`.
#[must_use]
pub fn signing_preimage(domain_separator: &B256, struct_hash: &B256) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + 32 + 32);
    data.extend_from_slice(&[0x19, 0x01]);
    data.extend_from_slice(domain_separator.as_slice());
    data.extend_from_slice(struct_hash.as_slice());
    data
}

/// Formats `Name(type1 name1,type2 name2)`.
fn format_type(type_name: &str, fields: &[TypeField]) -> String {
    let mut out = String::with_capacity(type_name.len() + 16 * fields.len());
    out.push_str(type_name);
    out.push('(');
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&field.field_type);
        out.push(' ');
        out.push_str(&field.name);
    }
    out.push(')');
    out
}

fn hash_with_type(type_hash: B256, encoded: &[u8]) -> B256 {
    let mut buf = Vec::with_capacity(32 + encoded.len());
    buf.extend_from_slice(type_hash.as_slice());
    buf.extend_from_slice(encoded);
    keccak256(&buf)
}

fn mismatch(field_type: &str, value: &Value) -> Error {
    Error::InvalidTypedData(format!("{value} is not a valid {field_type}"))
}

/// Encodes an atomic or dynamic value into its 32-byte word.
fn encode_atomic(field_type: &str, value: &Value) -> Result<B256> {
    let text = || value.as_str().ok_or_else(|| mismatch(field_type, value));

    match field_type {
        "string" => Ok(keccak256(text()?.as_bytes())),
        "bytes" => Ok(keccak256(decode_hex(text()?)?)),
        "bool" => {
            let flag = value.as_bool().ok_or_else(|| mismatch(field_type, value))?;
            Ok(B256::with_last_byte(u8::from(flag)))
        }
        "address" => {
            let address: AlloyAddress = text()?
                .parse()
                .map_err(|_| mismatch(field_type, value))?;
            Ok(address.into_word())
        }
        _ => {
            if let Some(size) = field_type.strip_prefix("bytes") {
                let size: usize = size
                    .parse()
                    .ok()
                    .filter(|size| (1..=32).contains(size))
                    .ok_or_else(|| Error::InvalidTypedData(format!("unknown type {field_type}")))?;
                let bytes = decode_hex(text()?)?;
                if bytes.len() > size {
                    return Err(mismatch(field_type, value));
                }
                let mut word = B256::ZERO;
                word[..bytes.len()].copy_from_slice(&bytes);
                Ok(word)
            } else if field_type.starts_with("uint") {
                Ok(B256::from(parse_integer(field_type, value, false)?.to_be_bytes::<32>()))
            } else if field_type.starts_with("int") {
                Ok(B256::from(parse_integer(field_type, value, true)?.to_be_bytes::<32>()))
            } else {
                Err(Error::InvalidTypedData(format!("unknown type {field_type}")))
            }
        }
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(s.trim_start_matches("0x"))?)
}

/// Parses a JSON number or a decimal (or `0x` hex) string. Signed types
/// accept a leading `-` and encode as two's complement.
fn parse_integer(field_type: &str, value: &Value, signed: bool) -> Result<U256> {
    let invalid = || mismatch(field_type, value);

    let (negative, magnitude) = match value {
        Value::Number(n) => match (n.as_u64(), n.as_i64()) {
            (Some(u), _) => (false, U256::from(u)),
            (None, Some(i)) => (true, U256::from(i.unsigned_abs())),
            _ => return Err(invalid()),
        },
        Value::String(s) => {
            let (negative, digits) = match s.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s.as_str()),
            };
            let magnitude = match digits.strip_prefix("0x") {
                Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
                None => U256::from_str_radix(digits, 10),
            }
            .map_err(|_| invalid())?;
            (negative, magnitude)
        }
        _ => return Err(invalid()),
    };

    match (negative, signed) {
        (false, _) => Ok(magnitude),
        (true, true) => Ok(magnitude.wrapping_neg()),
        (true, false) => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn mail_domain() -> Eip712Domain {
        Eip712Domain {
            name: Some("Ether Mail".to_string()),
            version: Some("1".to_string()),
            chain_id: Some(1),
            verifying_contract: Some("0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC".to_string()),
            salt: None,
        }
    }

    fn mail() -> TypedData {
        let types = json!({
            "Mail": [
                {"name": "from", "type": "Person"},
                {"name": "to", "type": "Person"},
                {"name": "contents", "type": "string"}
            ],
            "Person": [
                {"name": "name", "type": "string"},
                {"name": "wallet", "type": "address"}
            ]
        });

        let message = json!({
            "from": {
                "name": "Cow",
                "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"
            },
            "to": {
                "name": "Bob",
                "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"
            },
            "contents": "Hello, Bob!"
        });

        TypedData::new(mail_domain(), types, "Mail", message).unwrap()
    }

    #[test]
    fn eip712_reference_vector() {
        let typed = mail();

        assert_eq!(
            typed.encode_type("Mail").unwrap(),
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
        );
        assert_eq!(
            typed.domain_separator().unwrap(),
            "0xf2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
                .parse::<B256>()
                .unwrap()
        );
        assert_eq!(
            typed.struct_hash().unwrap(),
            "0xc52c0ee5d84264471806290a3f2c4cecfc5490626bf912d01f240d7a274b371e"
                .parse::<B256>()
                .unwrap()
        );
        assert_eq!(
            typed.signing_hash().unwrap(),
            "0xbe609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn encode_type_collects_transitive_dependencies() {
        let types = json!({
            "Tx": [
                {"name": "fee", "type": "Fee"},
                {"name": "memo", "type": "string"}
            ],
            "Fee": [
                {"name": "amount", "type": "Coin[]"},
                {"name": "gas", "type": "string"}
            ],
            "Coin": [
                {"name": "denom", "type": "string"},
                {"name": "amount", "type": "string"}
            ]
        });
        let typed = TypedData::new(mail_domain(), types, "Tx", json!({})).unwrap();

        assert_eq!(
            typed.encode_type("Tx").unwrap(),
            "Tx(Fee fee,string memo)Coin(string denom,string amount)Fee(Coin[] amount,string gas)"
        );
    }

    #[test]
    fn declared_domain_type_overrides_standard() {
        let domain = Eip712Domain {
            name: Some("Cosmos Web3".to_string()),
            version: Some("1.0.0".to_string()),
            chain_id: Some(9001),
            verifying_contract: Some("cosmos".to_string()),
            salt: Some("0".to_string()),
        };
        let types = json!({
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "string"},
                {"name": "salt", "type": "string"}
            ],
            "Empty": [{"name": "memo", "type": "string"}]
        });
        let typed = TypedData::new(domain.clone(), types, "Empty", json!({"memo": ""})).unwrap();
        assert!(!typed.domain_separator().unwrap().is_zero());

        // Without the declaration the standard address type is used, and
        // "cosmos" is not an address.
        let standard = TypedData::new(
            domain,
            json!({"Empty": [{"name": "memo", "type": "string"}]}),
            "Empty",
            json!({"memo": ""}),
        )
        .unwrap();
        assert!(matches!(
            standard.domain_separator(),
            Err(Error::InvalidTypedData(_))
        ));
    }

    #[test]
    fn signing_preimage_layout() {
        let typed = mail();
        let preimage = typed.signing_preimage().unwrap();

        assert_eq!(preimage.len(), 66);
        assert_eq!(&preimage[..2], &[0x19, 0x01]);
        assert_eq!(&preimage[2..34], typed.domain_separator().unwrap().as_slice());
        assert_eq!(&preimage[34..], typed.struct_hash().unwrap().as_slice());
    }

    #[test]
    fn arrays_hash_the_concatenated_item_words() {
        let types = json!({
            "Coin": [
                {"name": "denom", "type": "string"},
                {"name": "amount", "type": "string"}
            ],
            "Payout": [
                {"name": "ids", "type": "uint64[]"},
                {"name": "coins", "type": "Coin[]"}
            ]
        });
        let message = json!({
            "ids": [1, "2"],
            "coins": [{"denom": "aevmos", "amount": "5"}]
        });
        let typed = TypedData::new(mail_domain(), types, "Payout", message).unwrap();

        let mut ids = Vec::new();
        ids.extend_from_slice(B256::with_last_byte(1).as_slice());
        ids.extend_from_slice(B256::with_last_byte(2).as_slice());
        let coin = typed
            .hash_struct("Coin", &json!({"denom": "aevmos", "amount": "5"}))
            .unwrap();

        let mut expected = typed.type_hash("Payout").unwrap().to_vec();
        expected.extend_from_slice(keccak256(&ids).as_slice());
        expected.extend_from_slice(keccak256(coin).as_slice());
        assert_eq!(typed.struct_hash().unwrap(), keccak256(&expected));
    }

    #[test]
    fn json_document_keeps_its_digest() {
        let typed = mail();
        let json = typed.to_json().unwrap();
        assert!(json.contains("\"primaryType\":\"Mail\""));

        let parsed = TypedData::from_json(&json).unwrap();
        assert_eq!(parsed.signing_hash().unwrap(), typed.signing_hash().unwrap());
    }

    #[test]
    fn atomic_words() {
        assert_eq!(
            encode_atomic("string", &json!("aevmos")).unwrap(),
            keccak256("aevmos")
        );
        assert_eq!(
            encode_atomic("bool", &json!(false)).unwrap(),
            B256::ZERO
        );
        assert_eq!(
            encode_atomic("uint64", &json!("0x2a")).unwrap(),
            B256::with_last_byte(42)
        );
        assert_eq!(
            encode_atomic("int32", &json!(-1)).unwrap(),
            B256::repeat_byte(0xff)
        );
        assert_eq!(
            encode_atomic("bytes4", &json!("0xdeadbeef")).unwrap()[..4],
            [0xde, 0xad, 0xbe, 0xef]
        );
        assert_eq!(
            encode_atomic("bytes", &json!("0x")).unwrap(),
            keccak256([0u8; 0])
        );
    }

    #[test]
    fn atomic_mismatches_are_rejected() {
        for (field_type, value) in [
            ("uint64", json!(-1)),
            ("uint256", json!("ten")),
            ("bool", json!("true")),
            ("string", json!(7)),
            ("bytes2", json!("0x010203")),
            ("bytes33", json!("0x01")),
            ("address", json!("evmos1")),
            ("float", json!(1)),
        ] {
            assert!(
                matches!(
                    encode_atomic(field_type, &value),
                    Err(Error::InvalidTypedData(_))
                ),
                "{field_type} {value}"
            );
        }
    }

    #[test]
    fn missing_field_is_rejected() {
        let mut typed = mail();
        typed.message = json!({"from": typed.message["from"].clone(), "contents": "x"});
        assert!(matches!(
            typed.signing_hash(),
            Err(Error::InvalidTypedData(_))
        ));
    }

    #[test]
    fn malformed_type_table_is_rejected() {
        let result = TypedData::new(mail_domain(), json!({"Bad": "nope"}), "Bad", json!({}));
        assert!(matches!(result, Err(Error::InvalidTypedData(_))));
    }

    #[test]
    fn unknown_primary_type() {
        let typed = TypedData::new(mail_domain(), json!({}), "MsgSend", json!({})).unwrap();
        assert!(matches!(
            typed.signing_hash(),
            Err(Error::UndefinedType(name)) if name == "MsgSend"
        ));
    }
}
