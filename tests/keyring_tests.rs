mod util;

use std::sync::Arc;
use std::time::Duration;

use aa_keyring_wallet::accounts::AccountSigner;
use aa_keyring_wallet::core::errors::{KeyringError, SigningError, VaultError, WalletError};
use aa_keyring_wallet::core::{AccountContext, KeyringRecord, SigningContext};
use aa_keyring_wallet::storage::{MemoryVaultSink, UnlockCredential, VaultStatus};
use ethers::types::{Address, Signature};
use secrecy::SecretString;
use serde_json::json;

const OWNER_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

fn import(index: u64) -> Option<AccountContext> {
    Some(AccountContext { private_key: Some(SecretString::new(OWNER_KEY.to_string())), index: Some(index) })
}

#[tokio::test]
async fn added_accounts_come_back_after_unlock() {
    let (keyring, chain, relay, sink) = util::unlocked_keyring().await;
    let simple = keyring.add("simple", None).await.unwrap();
    let approval = keyring.add("approval", import(1)).await.unwrap();
    assert_ne!(simple, approval);
    assert_eq!(sink.write_count(), 3);

    let next_session = util::keyring_with(chain, relay, sink).await;
    assert!(next_session.is_empty());
    let mut restored = next_session.unlock(UnlockCredential::Password(util::password())).await.unwrap();
    restored.sort();
    assert_eq!(restored, keyring.addresses());
    assert_eq!(next_session.get(approval).unwrap().implementation_type(), "approval");
    assert_eq!(next_session.snapshot().unwrap(), keyring.snapshot().unwrap());
}

#[tokio::test]
async fn imported_key_derives_stable_address_per_index() {
    let (first, ..) = util::unlocked_keyring().await;
    let (second, ..) = util::unlocked_keyring().await;

    let a = first.add("simple", import(0)).await.unwrap();
    let b = second.add("simple", import(0)).await.unwrap();
    let c = second.add("simple", import(1)).await.unwrap();
    assert_eq!(a, b);
    assert_ne!(b, c);

    let again = first.add("simple", import(0)).await;
    assert_eq!(again, Err(KeyringError::DuplicateAccount(a).into()));
    assert_eq!(first.len(), 1);
}

#[tokio::test]
async fn concurrent_adds_are_both_persisted() {
    let (keyring, chain, relay, sink) = util::unlocked_keyring().await;

    let (a, b) = tokio::join!(keyring.add("simple", None), keyring.add("simple", import(4)));
    let (a, b) = (a.unwrap(), b.unwrap());

    let stored: Vec<Address> = keyring.vault().records().iter().map(|r| r.address).collect();
    assert!(stored.contains(&a) && stored.contains(&b));

    let next_session = util::keyring_with(chain, relay, sink).await;
    next_session.unlock(UnlockCredential::Password(util::password())).await.unwrap();
    assert_eq!(next_session.len(), 2);
}

#[tokio::test]
async fn duplicate_records_restore_nothing() {
    let (keyring, ..) = util::unlocked_keyring().await;
    let address = keyring.add("simple", import(2)).await.unwrap();
    let record = keyring.snapshot().unwrap().remove(0);

    let (fresh, ..) = util::unlocked_keyring().await;
    let other = KeyringRecord { address: Address::repeat_byte(0x99), ..record.clone() };
    let result = fresh.restore(vec![record, other]).await;
    assert_eq!(result, Err(KeyringError::DuplicateAccount(address).into()));
    assert!(fresh.is_empty());
}

#[tokio::test]
async fn zero_address_is_never_registered() {
    let (keyring, chain, _relay, sink) = util::unlocked_keyring().await;
    chain.derive_zero_addresses();

    let result = keyring.add("simple", None).await;
    assert!(matches!(result, Err(WalletError::Keyring(KeyringError::AddressDerivationFailed(_)))));
    assert!(keyring.is_empty());
    assert_eq!(sink.write_count(), 1);
}

#[tokio::test]
async fn failed_persist_rolls_back_add() {
    let chain = Arc::new(util::MockChain::new());
    let relay = Arc::new(util::MockRelay::new());
    let sink = Arc::new(util::FlakySink::default());
    let keyring = util::keyring_with(chain, relay, sink.clone()).await;
    keyring.create_new_vault(util::password()).await.unwrap();

    sink.set_failing(true);
    let result = keyring.add("simple", None).await;
    assert_eq!(result, Err(VaultError::Persistence("disk full".into()).into()));
    assert!(keyring.is_empty());

    sink.set_failing(false);
    keyring.add("simple", None).await.unwrap();
    assert_eq!(keyring.len(), 1);
}

#[tokio::test]
async fn add_requires_unlocked_vault() {
    let chain = Arc::new(util::MockChain::new());
    let relay = Arc::new(util::MockRelay::new());
    let keyring = util::keyring_with(chain, relay, Arc::new(MemoryVaultSink::new())).await;

    let result = keyring.add("simple", None).await;
    assert_eq!(result, Err(VaultError::NoCredential.into()));
    assert!(keyring.is_empty());
}

#[tokio::test]
async fn unknown_implementation_is_rejected() {
    let (keyring, ..) = util::unlocked_keyring().await;
    let result = keyring.add("multisig", None).await;
    assert_eq!(result, Err(KeyringError::UnknownImplementation("multisig".into()).into()));
    assert_eq!(keyring.registry().tags(), vec!["approval".to_string(), "simple".to_string()]);
}

#[tokio::test]
async fn unreadable_record_relocks_vault() {
    let (keyring, chain, relay, sink) = util::unlocked_keyring().await;
    let bad = KeyringRecord {
        implementation_type: "hardware".to_string(),
        address: Address::repeat_byte(0x42),
        data: json!({}),
    };
    keyring.vault().persist(vec![bad]).await.unwrap();

    let next_session = util::keyring_with(chain, relay, sink).await;
    let result = next_session.unlock(UnlockCredential::Password(util::password())).await;
    assert_eq!(result, Err(KeyringError::UnknownImplementation("hardware".into()).into()));
    assert_eq!(next_session.vault().status(), VaultStatus::Locked);
    assert!(next_session.is_empty());
}

#[tokio::test]
async fn derived_address_wins_over_stored() {
    let (keyring, chain, relay, sink) = util::unlocked_keyring().await;
    let address = keyring.add("simple", import(3)).await.unwrap();
    let mut records = keyring.snapshot().unwrap();
    records[0].address = Address::repeat_byte(0x11);
    keyring.vault().persist(records).await.unwrap();

    let next_session = util::keyring_with(chain, relay, sink).await;
    let restored = next_session.unlock(UnlockCredential::Password(util::password())).await.unwrap();
    assert_eq!(restored, vec![address]);
}

#[tokio::test]
async fn approval_account_needs_confirmation() {
    let (keyring, ..) = util::unlocked_keyring().await;
    let address = keyring.add("approval", import(0)).await.unwrap();

    for ctx in [SigningContext::default(), SigningContext::refused()] {
        let result = keyring.sign_message(address, b"gm", &ctx).await;
        assert_eq!(result, Err(SigningError::SigningRejected.into()));
    }

    let signature = keyring.sign_message(address, b"gm", &SigningContext::approved()).await.unwrap();
    let signature = Signature::try_from(&signature[..]).unwrap();
    let owner: ethers::signers::LocalWallet = OWNER_KEY.parse().unwrap();
    assert_eq!(signature.recover("gm").unwrap(), ethers::signers::Signer::address(&owner));
}

#[tokio::test]
async fn remove_and_lock_clear_accounts() {
    let (keyring, ..) = util::unlocked_keyring().await;
    let a = keyring.add("simple", None).await.unwrap();
    let b = keyring.add("simple", None).await.unwrap();

    keyring.remove(a).unwrap();
    assert_eq!(keyring.remove(a), Err(KeyringError::UnknownAccount(a)));
    assert_eq!(keyring.addresses(), vec![b]);

    keyring.lock();
    assert!(keyring.is_empty());
    assert!(!keyring.vault().is_unlocked());
    assert!(matches!(
        keyring.sign_message(b, b"x", &SigningContext::default()).await,
        Err(WalletError::Keyring(KeyringError::UnknownAccount(_)))
    ));
}

#[tokio::test]
async fn change_password_keeps_accounts() {
    let (keyring, chain, relay, sink) = util::unlocked_keyring().await;
    let address = keyring.add("simple", None).await.unwrap();
    let new_password = SecretString::new("rotated".to_string());
    keyring.change_password(new_password.clone()).await.unwrap();

    let next_session = util::keyring_with(chain, relay, sink).await;
    let old = next_session.unlock(UnlockCredential::Password(util::password())).await;
    assert_eq!(old, Err(VaultError::DecryptionFailure.into()));
    let restored = next_session.unlock(UnlockCredential::Password(new_password)).await.unwrap();
    assert_eq!(restored, vec![address]);
}

#[tokio::test]
async fn failed_unlock_drops_registered_accounts() {
    let (keyring, ..) = util::unlocked_keyring().await;
    let address = keyring.add("simple", None).await.unwrap();

    let result = keyring.unlock(UnlockCredential::Password(SecretString::new("wrong".into()))).await;
    assert_eq!(result, Err(VaultError::DecryptionFailure.into()));
    assert_eq!(keyring.vault().status(), VaultStatus::Locked);
    assert!(keyring.is_empty());
    assert!(matches!(
        keyring.sign_message(address, b"x", &SigningContext::default()).await,
        Err(WalletError::Keyring(KeyringError::UnknownAccount(_)))
    ));

    let restored = keyring.unlock(UnlockCredential::Password(util::password())).await.unwrap();
    assert_eq!(restored, vec![address]);
}

#[tokio::test]
async fn unlock_replaces_previous_accounts() {
    let (keyring, chain, relay, sink) = util::unlocked_keyring().await;
    let stored = keyring.add("simple", None).await.unwrap();

    let (other, ..) = util::unlocked_keyring().await;
    let stray = other.add("simple", import(5)).await.unwrap();
    let records = other.snapshot().unwrap();

    let session = util::keyring_with(chain, relay, sink).await;
    session.restore(records).await.unwrap();
    assert_eq!(session.addresses(), vec![stray]);

    let restored = session.unlock(UnlockCredential::Password(util::password())).await.unwrap();
    assert_eq!(restored, vec![stored]);
    assert_eq!(session.addresses(), vec![stored]);
}

#[tokio::test]
async fn add_dropped_before_persist_registers_nothing() {
    let chain = Arc::new(util::MockChain::new());
    let relay = Arc::new(util::MockRelay::new());
    let sink = Arc::new(util::SlowSink::new(Duration::from_millis(200)));
    let keyring = util::keyring_with(chain, relay, sink.clone()).await;
    keyring.create_new_vault(util::password()).await.unwrap();

    let (busy, queued) = tokio::join!(
        keyring.persist(),
        tokio::time::timeout(Duration::from_millis(20), keyring.add("simple", None)),
    );
    busy.unwrap();
    assert!(queued.is_err());
    assert!(keyring.is_empty());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sink.inner.write_count(), 2);
    assert!(keyring.vault().records().is_empty());
}
