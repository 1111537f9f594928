//! Keyring Manager
//!
//! Owns every account signer of the unlocked wallet and keeps the vault in
//! step with them.
//!
//! ## Module Structure
//! - `lifecycle` - vault creation, unlock/lock, restore, add/remove
//! - `operations` - user operation building, signing, submission, receipts

pub mod lifecycle;
pub mod operations;

use ethers::types::{Address, Bytes, U256};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::accounts::{AccountSigner, SignerRegistry};
use crate::core::domain::KeyringRecord;
use crate::core::errors::{KeyringError, VaultError};
use crate::relay::RelayClient;
use crate::storage::VaultStore;
use crate::user_op::UserOperationBuilder;

/// Deployment and funding snapshot of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuote {
    pub address: Address,
    pub implementation_type: String,
    pub deployed: bool,
    pub creation_gas: U256,
    pub factory_data: Bytes,
    pub balance: U256,
}

/// Account registry backed by the encrypted vault.
pub struct KeyringManager {
    vault: VaultStore,
    registry: SignerRegistry,
    relay: Arc<dyn RelayClient>,
    builder: UserOperationBuilder,

    /// address → signer
    accounts: Arc<RwLock<HashMap<Address, Arc<dyn AccountSigner>>>>,

    /// address → signing gate
    signing_locks: Mutex<HashMap<Address, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyringManager {
    pub fn new(vault: VaultStore, registry: SignerRegistry, relay: Arc<dyn RelayClient>) -> Self {
        let builder = UserOperationBuilder::new(relay.clone(), registry.environment().entry_point);
        Self {
            vault,
            registry,
            relay,
            builder,
            accounts: Arc::new(RwLock::new(HashMap::new())),
            signing_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn vault(&self) -> &VaultStore {
        &self.vault
    }

    pub fn registry(&self) -> &SignerRegistry {
        &self.registry
    }

    pub fn entry_point(&self) -> Address {
        self.builder.entry_point()
    }

    pub fn get(&self, address: Address) -> Result<Arc<dyn AccountSigner>, KeyringError> {
        self.accounts.read().get(&address).cloned().ok_or(KeyringError::UnknownAccount(address))
    }

    /// Registered account addresses, sorted.
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.accounts.read().keys().copied().collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    /// Vault records for the current registry, sorted by address.
    pub fn snapshot(&self) -> Result<Vec<KeyringRecord>, VaultError> {
        let accounts = self.accounts.read();
        let mut records = accounts
            .iter()
            .map(|(address, signer)| {
                let data = signer.serialize().map_err(|e| VaultError::Serialization(e.to_string()))?;
                Ok(KeyringRecord {
                    implementation_type: signer.implementation_type().to_string(),
                    address: *address,
                    data,
                })
            })
            .collect::<Result<Vec<_>, VaultError>>()?;
        records.sort_by_key(|r| r.address);
        Ok(records)
    }

    fn signing_lock(&self, address: Address) -> Arc<tokio::sync::Mutex<()>> {
        self.signing_locks.lock().entry(address).or_default().clone()
    }
}
