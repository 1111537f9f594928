// tests/util.rs
// Shared test doubles for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, H256, U256};
use ethers::utils::keccak256;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aa_keyring_wallet::accounts::{AccountEnvironment, SignerRegistry};
use aa_keyring_wallet::blockchain::{ChainProvider, FeeData};
use aa_keyring_wallet::core::abi::selector_from_signature;
use aa_keyring_wallet::core::config::WalletConfig;
use aa_keyring_wallet::core::errors::{ChainError, RelayError, VaultError};
use aa_keyring_wallet::crypto::{KdfParams, VaultEncryptor, VaultEnvelope};
use aa_keyring_wallet::storage::{MemoryVaultSink, VaultSink, VaultStore, VaultUpdate};
use aa_keyring_wallet::user_op::{GasEstimate, RelayReceipt, SignedUserOperation};
use aa_keyring_wallet::KeyringManager;

pub const CHAIN_ID: u64 = 11155111;
pub const CREATION_GAS: u64 = 250_000;
pub const CALL_GAS: u64 = 35_000;
pub const MAX_FEE: u64 = 30_000_000_000;
pub const PRIORITY_FEE: u64 = 1_500_000_000;

pub fn entry_point() -> Address {
    Address::repeat_byte(0xee)
}

pub fn factory() -> Address {
    Address::repeat_byte(0xfa)
}

/// Cheap KDF so unlock/persist round trips stay fast.
pub fn test_encryptor() -> VaultEncryptor {
    VaultEncryptor::new(KdfParams::Pbkdf2Sha256 { iterations: 1_000 })
}

fn word(bytes: &[u8]) -> Bytes {
    let mut out = vec![0u8; 32 - bytes.len()];
    out.extend_from_slice(bytes);
    Bytes::from(out)
}

/// In-memory chain. The factory's `getAddress` answers with an address
/// hashed from the call arguments, so distinct owners get distinct accounts.
pub struct MockChain {
    code: RwLock<HashMap<Address, Bytes>>,
    nonce: RwLock<U256>,
    logs: RwLock<Vec<Log>>,
    zero_addresses: RwLock<bool>,
    pub balance: U256,
    pub fees: FeeData,
    pub calls: AtomicUsize,
}

impl MockChain {
    /// Chain with a deployed entry point and factory.
    pub fn new() -> Self {
        let chain = Self {
            code: RwLock::new(HashMap::new()),
            nonce: RwLock::new(U256::zero()),
            logs: RwLock::new(Vec::new()),
            zero_addresses: RwLock::new(false),
            balance: U256::from(10u64).pow(U256::from(18u64)),
            fees: FeeData {
                max_fee_per_gas: U256::from(MAX_FEE),
                max_priority_fee_per_gas: U256::from(PRIORITY_FEE),
            },
            calls: AtomicUsize::new(0),
        };
        chain.deploy(entry_point());
        chain.deploy(factory());
        chain
    }

    pub fn deploy(&self, address: Address) {
        self.code.write().insert(address, Bytes::from(vec![0x60, 0x80]));
    }

    pub fn undeploy(&self, address: Address) {
        self.code.write().remove(&address);
    }

    pub fn set_nonce(&self, nonce: u64) {
        *self.nonce.write() = U256::from(nonce);
    }

    pub fn push_log(&self, log: Log) {
        self.logs.write().push(log);
    }

    /// Make the factory return the zero address from `getAddress`.
    pub fn derive_zero_addresses(&self) {
        *self.zero_addresses.write() = true;
    }
}

#[async_trait]
impl ChainProvider for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(CHAIN_ID)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self.code.read().get(&address).cloned().unwrap_or_default())
    }

    async fn get_balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(self.balance)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let selector = data.get(..4).ok_or_else(|| ChainError::Rpc("empty calldata".into()))?;
        if to == factory() && selector == selector_from_signature("getAddress(address,uint256)") {
            if *self.zero_addresses.read() {
                return Ok(word(&[]));
            }
            let hash = keccak256(&data[4..]);
            return Ok(word(&hash[12..]));
        }
        if to == entry_point() && selector == selector_from_signature("getNonce(address,uint192)") {
            let mut out = [0u8; 32];
            self.nonce.read().to_big_endian(&mut out);
            return Ok(Bytes::from(out.to_vec()));
        }
        Err(ChainError::Rpc(format!("execution reverted: unexpected call to {:?}", to)))
    }

    async fn estimate_gas(
        &self,
        from: Option<Address>,
        _to: Address,
        _data: Bytes,
    ) -> Result<U256, ChainError> {
        match from {
            Some(_) => Ok(U256::from(CALL_GAS)),
            None => Ok(U256::from(CREATION_GAS)),
        }
    }

    async fn fee_data(&self) -> Result<FeeData, ChainError> {
        Ok(self.fees)
    }

    async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>, ChainError> {
        Ok(self.logs.read().clone())
    }
}

/// Scriptable bundler.
pub struct MockRelay {
    entry_points: Vec<Address>,
    estimate: RwLock<Result<GasEstimate, RelayError>>,
    receipts: RwLock<HashMap<H256, RelayReceipt>>,
    pub estimated: Mutex<Vec<SignedUserOperation>>,
    pub sent: Mutex<Vec<SignedUserOperation>>,
}

impl MockRelay {
    pub fn new() -> Self {
        Self::with_entry_points(vec![entry_point()])
    }

    pub fn with_entry_points(entry_points: Vec<Address>) -> Self {
        Self {
            entry_points,
            estimate: RwLock::new(Ok(GasEstimate::default())),
            receipts: RwLock::new(HashMap::new()),
            estimated: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_estimate(&self, estimate: GasEstimate) {
        *self.estimate.write() = Ok(estimate);
    }

    pub fn fail_estimates(&self, error: RelayError) {
        *self.estimate.write() = Err(error);
    }

    pub fn add_receipt(&self, receipt: RelayReceipt) {
        self.receipts.write().insert(receipt.user_op_hash, receipt);
    }
}

#[async_trait]
impl aa_keyring_wallet::relay::RelayClient for MockRelay {
    async fn supported_entry_points(&self) -> Result<Vec<Address>, RelayError> {
        Ok(self.entry_points.clone())
    }

    async fn estimate_user_operation_gas(
        &self,
        op: &SignedUserOperation,
        _entry_point: Address,
    ) -> Result<GasEstimate, RelayError> {
        self.estimated.lock().push(op.clone());
        self.estimate.read().clone()
    }

    async fn send_user_operation(
        &self,
        op: &SignedUserOperation,
        entry_point: Address,
    ) -> Result<H256, RelayError> {
        self.sent.lock().push(op.clone());
        Ok(op.hash(entry_point, CHAIN_ID))
    }

    async fn get_user_operation_receipt(&self, hash: H256) -> Result<Option<RelayReceipt>, RelayError> {
        Ok(self.receipts.read().get(&hash).cloned())
    }
}

/// Memory sink that takes `delay` per write.
pub struct SlowSink {
    pub inner: MemoryVaultSink,
    pub delay: Duration,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        Self { inner: MemoryVaultSink::new(), delay }
    }
}

#[async_trait]
impl VaultSink for SlowSink {
    async fn load(&self) -> Result<Option<VaultEnvelope>, VaultError> {
        self.inner.load().await
    }

    async fn store(&self, update: &VaultUpdate) -> Result<(), VaultError> {
        tokio::time::sleep(self.delay).await;
        self.inner.store(update).await
    }
}

/// Memory sink whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakySink {
    pub inner: MemoryVaultSink,
    failing: RwLock<bool>,
}

impl FlakySink {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.write() = failing;
    }
}

#[async_trait]
impl VaultSink for FlakySink {
    async fn load(&self) -> Result<Option<VaultEnvelope>, VaultError> {
        self.inner.load().await
    }

    async fn store(&self, update: &VaultUpdate) -> Result<(), VaultError> {
        if *self.failing.read() {
            return Err(VaultError::Persistence("disk full".into()));
        }
        self.inner.store(update).await
    }
}

pub fn environment(chain: Arc<MockChain>) -> AccountEnvironment {
    AccountEnvironment { provider: chain, entry_point: entry_point(), factory: factory() }
}

pub async fn keyring_with(
    chain: Arc<MockChain>,
    relay: Arc<MockRelay>,
    sink: Arc<dyn VaultSink>,
) -> KeyringManager {
    let vault = VaultStore::open(sink, test_encryptor()).await.unwrap();
    KeyringManager::new(vault, SignerRegistry::with_defaults(environment(chain)), relay)
}

/// Keyring over fresh mocks with an unlocked, empty vault.
pub async fn unlocked_keyring() -> (KeyringManager, Arc<MockChain>, Arc<MockRelay>, Arc<MemoryVaultSink>) {
    let chain = Arc::new(MockChain::new());
    let relay = Arc::new(MockRelay::new());
    let sink = Arc::new(MemoryVaultSink::new());
    let keyring = keyring_with(chain.clone(), relay.clone(), sink.clone()).await;
    keyring.create_new_vault(password()).await.unwrap();
    (keyring, chain, relay, sink)
}

pub fn password() -> secrecy::SecretString {
    secrecy::SecretString::new("correct horse battery staple".to_string())
}

/// Configuration pointing at the mock entry point and factory.
pub fn test_config(vault_path: std::path::PathBuf) -> WalletConfig {
    let mut config = WalletConfig::default();
    config.security.pbkdf2_iterations = 1_000;
    config.relay.entry_point = entry_point();
    config.accounts.simple_account_factory = factory();
    config.storage.vault_path = vault_path;
    config
}
