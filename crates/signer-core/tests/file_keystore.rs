//! Keyrings persisted to disk and restored in a later process.

// Silence unused crate dependency warnings for test binary
use alloy_primitives as _;
use alloy_rlp as _;
use bech32 as _;
use hex as _;
use k256 as _;
use parking_lot as _;
use proptest as _;
use rand as _;
use serde as _;
use serde_json as _;
use sha2 as _;
use thiserror as _;
use toml as _;
use tracing as _;
use tracing_subscriber as _;
use zeroize as _;

use std::fs;
use std::sync::Arc;

use ledger_signer_core::account::{AccountInfo, StaticAccountRetriever};
use ledger_signer_core::config::SignerConfig;
use ledger_signer_core::crypto::KeyPair;
use ledger_signer_core::keyring::{FileKeystore, KeyKind, Keyring, Keystore};
use ledger_signer_core::ledger::mock::MockDevice;
use ledger_signer_core::ledger::{DerivationPath, DeviceClass};
use ledger_signer_core::orchestrator::{CancelToken, Orchestrator, TxRequest};
use ledger_signer_core::transaction::{Coin, Fee, Msg, MsgVote, VoteOption};

#[test]
fn restored_keys_keep_their_identity() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileKeystore::open(dir.path()).unwrap());

    let device_key = KeyPair::generate();
    let path: DerivationPath = "m/44'/60'/0'/0/7".parse().unwrap();
    let handle = MockDevice::new(DeviceClass::EthereumApp).handle();
    handle.expect_get_public_key(&path, Ok(device_key.public_key().clone()));

    let (alice, ledger) = {
        let keyring = Keyring::new(Arc::clone(&store) as Arc<dyn Keystore>);
        let alice = keyring.create_software("alice").unwrap();
        let ledger = keyring
            .create_hardware("ledger", path.clone(), handle.selector())
            .unwrap();
        (alice, ledger)
    };
    assert_eq!(store.names().unwrap(), vec!["alice", "ledger"]);

    // Hardware records hold no secret.
    let ledger_file = fs::read_to_string(dir.path().join("ledger.toml")).unwrap();
    assert!(ledger_file.contains("kind = \"hardware\""));
    assert!(!ledger_file.contains("secret_key"));

    let keyring = Keyring::new(store as Arc<dyn Keystore>);
    assert_eq!(keyring.restore("alice", None).unwrap(), alice);
    assert_eq!(
        keyring.restore("ledger", Some(handle.selector())).unwrap(),
        ledger
    );
    assert_eq!(
        ledger.kind,
        KeyKind::Hardware {
            path,
            class: DeviceClass::EthereumApp
        }
    );

    let signature = keyring.sign("alice", b"after restart").unwrap();
    assert_eq!(signature.public_key(), &alice.public_key);
    handle.assert_done();
}

#[test]
fn deleted_keys_are_gone_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileKeystore::open(dir.path()).unwrap());
    let keyring = Keyring::new(Arc::clone(&store) as Arc<dyn Keystore>);

    keyring.create_software("temp").unwrap();
    assert!(dir.path().join("temp.toml").exists());

    keyring.delete("temp").unwrap();
    assert!(!dir.path().join("temp.toml").exists());
    assert!(store.names().unwrap().is_empty());
    assert!(keyring.list().is_empty());
}

#[test]
fn configured_stack_signs_a_vote() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("signer.toml");
    fs::write(
        &config_path,
        format!(
            "[chain]\nchain_id = \"evmos_9000-4\"\n\n[keystore]\ndir = {:?}\n",
            dir.path().join("keys")
        ),
    )
    .unwrap();

    let config = SignerConfig::load(&config_path).unwrap();
    let keyring = Arc::new(config.keyring().unwrap());
    let voter = keyring.create_software("voter").unwrap();
    let accounts = Arc::new(
        StaticAccountRetriever::new().with_account(voter.address, AccountInfo::new(3, 11)),
    );
    let orchestrator = Orchestrator::new(keyring, accounts, config.chain.clone());

    let bech32 = config.chain.bech32();
    let request = TxRequest::new(
        vec![Msg::Vote(MsgVote {
            proposal_id: 42,
            voter: bech32.encode(&voter.address).unwrap(),
            option: VoteOption::Yes,
        })],
        Fee::new(vec![Coin::new(&config.chain.fee_denom, 1_000).unwrap()], 100_000),
    )
    .with_memo("lgtm");

    let tx = orchestrator
        .sign_tx("voter", request, &CancelToken::new())
        .unwrap();
    assert_eq!(tx.signer.sequence, 11);
    assert_eq!(tx.body.memo, "lgtm");
    assert!(dir.path().join("keys/voter.toml").exists());
}
