use ethers::types::{Address, H256};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

use crate::accounts::{AccountEnvironment, SignerRegistry};
use crate::blockchain::{ChainProvider, EthereumClient};
use crate::core::config::WalletConfig;
use crate::core::domain::{SigningContext, TransactionIntent};
use crate::core::errors::WalletError;
use crate::crypto::VaultEncryptor;
use crate::keyring::KeyringManager;
use crate::relay::{check_entry_point, BundlerClient, RelayClient};
use crate::storage::{FileVaultSink, UnlockCredential, VaultSink, VaultStore};

/// Wallet service layer: wires configuration, transports, vault and keyring.
pub struct WalletService {
    config: WalletConfig,
    chain: Arc<dyn ChainProvider>,
    keyring: KeyringManager,
}

impl WalletService {
    /// Connect to the configured chain and bundler, verify the entry point
    /// and open the vault file. Only returns once the startup checks pass.
    pub async fn init(config: WalletConfig) -> Result<Self, WalletError> {
        config.validate()?;

        let chain = match config.network.chain_id {
            Some(expected) => {
                EthereumClient::connect_with_chain_id(&config.network.rpc_url, expected).await?
            }
            None => EthereumClient::connect(&config.network.rpc_url).await?,
        };
        let relay = BundlerClient::new(&config.relay.bundler_url)?;
        let sink = Arc::new(FileVaultSink::new(config.storage.vault_path.clone()));

        Self::with_components(config, Arc::new(chain), Arc::new(relay), sink).await
    }

    /// Same startup sequence over caller-supplied transports and sink.
    pub async fn with_components(
        config: WalletConfig,
        chain: Arc<dyn ChainProvider>,
        relay: Arc<dyn RelayClient>,
        sink: Arc<dyn VaultSink>,
    ) -> Result<Self, WalletError> {
        let entry_point = config.relay.entry_point;
        check_entry_point(relay.as_ref(), chain.as_ref(), entry_point).await?;

        let encryptor = VaultEncryptor::new(config.security.kdf_params());
        let vault = VaultStore::open(sink, encryptor).await?;

        let env = AccountEnvironment {
            provider: chain.clone(),
            entry_point,
            factory: config.accounts.simple_account_factory,
        };
        let keyring = KeyringManager::new(vault, SignerRegistry::with_defaults(env), relay);

        info!(
            entry_point = ?entry_point,
            has_vault = keyring.vault().has_vault(),
            "Wallet service ready"
        );
        Ok(Self { config, chain, keyring })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<dyn ChainProvider> {
        &self.chain
    }

    pub fn keyring(&self) -> &KeyringManager {
        &self.keyring
    }

    /// Unlock the existing vault with `password`, or create one when none is
    /// stored yet. Returns the restored account addresses.
    pub async fn open_vault(&self, password: SecretString) -> Result<Vec<Address>, WalletError> {
        if self.keyring.vault().has_vault() {
            self.keyring.unlock(UnlockCredential::Password(password)).await
        } else {
            self.keyring.create_new_vault(password).await?;
            Ok(Vec::new())
        }
    }

    /// Build, sign and submit one user operation for `intent`.
    pub async fn execute(
        &self,
        address: Address,
        intent: &TransactionIntent,
        ctx: &SigningContext,
    ) -> Result<H256, WalletError> {
        let unsigned = self.keyring.create_unsigned_user_op(address, intent, ctx).await?;
        let signed = self.keyring.sign_user_op(address, unsigned, ctx).await?;
        self.keyring.send_user_op(address, &signed).await
    }
}
