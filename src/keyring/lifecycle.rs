use ethers::types::Address;
use futures::future::try_join_all;
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::KeyringManager;
use crate::accounts::{AccountSigner, InitParams};
use crate::core::domain::{AccountContext, KeyringRecord};
use crate::core::errors::{KeyringError, WalletError};
use crate::storage::UnlockCredential;

impl KeyringManager {
    /// First-time setup: encrypt the current (normally empty) registry under
    /// `password`.
    pub async fn create_new_vault(&self, password: SecretString) -> Result<(), WalletError> {
        let records = self.snapshot()?;
        self.vault.create_new_vault(password, records).await?;
        Ok(())
    }

    /// Unlock the vault and rebuild every stored account, replacing whatever
    /// was registered before. On any failure the registry is emptied, and if
    /// the accounts cannot be rebuilt the vault is locked again so a later
    /// persist cannot overwrite it with a partial registry.
    pub async fn unlock(&self, credential: UnlockCredential) -> Result<Vec<Address>, WalletError> {
        let records = match self.vault.unlock(credential).await {
            Ok(records) => records,
            Err(e) => {
                // a rejected attempt has already dropped the vault's credential
                if !self.vault.is_unlocked() {
                    self.clear_all();
                }
                return Err(e.into());
            }
        };
        match self.restore(records).await {
            Ok(addresses) => Ok(addresses),
            Err(e) => {
                warn!("Failed to restore accounts from vault: {}", e);
                self.lock();
                Err(e)
            }
        }
    }

    pub fn lock(&self) {
        self.vault.lock();
        self.clear_all();
    }

    /// Build a signer per record concurrently, then install them as the whole
    /// registry in one step. The registry is untouched if any record fails or
    /// two records derive the same address.
    pub async fn restore(&self, records: Vec<KeyringRecord>) -> Result<Vec<Address>, WalletError> {
        let built =
            try_join_all(records.into_iter().map(|record| self.restore_signer(record))).await?;

        let mut seen = HashSet::with_capacity(built.len());
        for (address, _) in &built {
            if !seen.insert(*address) {
                return Err(KeyringError::DuplicateAccount(*address).into());
            }
        }

        let addresses: Vec<Address> = built.iter().map(|(a, _)| *a).collect();
        *self.accounts.write() = built.into_iter().collect();
        self.signing_locks.lock().clear();
        info!(accounts = addresses.len(), "Keyring restored");
        Ok(addresses)
    }

    async fn restore_signer(
        &self,
        record: KeyringRecord,
    ) -> Result<(Address, Arc<dyn AccountSigner>), WalletError> {
        let mut signer = self.registry.create(&record.implementation_type)?;
        signer.initialize(InitParams::Restore(record.data)).await?;
        let address = signer.address();
        if address.is_zero() {
            return Err(KeyringError::AddressDerivationFailed(format!(
                "stored {} account {:?} derived the zero address",
                record.implementation_type, record.address
            ))
            .into());
        }
        if address != record.address {
            warn!(
                stored = ?record.address,
                derived = ?address,
                "Stored account address differs from derived address; using derived"
            );
        }
        Ok((address, Arc::from(signer)))
    }

    /// Create, register and persist a new account.
    ///
    /// # Arguments
    /// * `implementation_type` - registry tag, e.g. `"simple"`
    /// * `ctx` - optional owner key import and factory salt
    ///
    /// # Returns
    /// The counterfactual account address. If the vault write fails the
    /// account is deregistered and the error returned.
    pub async fn add(
        &self,
        implementation_type: &str,
        ctx: Option<AccountContext>,
    ) -> Result<Address, WalletError> {
        let mut signer = self.registry.create(implementation_type)?;
        signer.initialize(InitParams::Fresh(ctx)).await?;
        let address = signer.address();
        if address.is_zero() {
            return Err(KeyringError::AddressDerivationFailed(format!(
                "{} account derived the zero address",
                implementation_type
            ))
            .into());
        }

        if self.accounts.read().contains_key(&address) {
            return Err(KeyringError::DuplicateAccount(address).into());
        }

        // Registration happens under the persist gate, together with the
        // snapshot. An add dropped while queued for the gate registers nothing.
        let signer: Arc<dyn AccountSigner> = Arc::from(signer);
        let mut registered = false;
        let persisted = self
            .vault
            .persist_with(|| {
                {
                    let mut accounts = self.accounts.write();
                    if accounts.contains_key(&address) {
                        return Err(WalletError::from(KeyringError::DuplicateAccount(address)));
                    }
                    accounts.insert(address, signer);
                }
                registered = true;
                self.snapshot().map_err(WalletError::from)
            })
            .await;

        if let Err(e) = persisted {
            if registered {
                warn!(address = ?address, "Persist failed after add; rolling back: {}", e);
                self.accounts.write().remove(&address);
            }
            return Err(e);
        }

        info!(address = ?address, implementation_type, "Account added");
        Ok(address)
    }

    /// Deregister an account. The vault is not rewritten.
    pub fn remove(&self, address: Address) -> Result<(), KeyringError> {
        self.accounts.write().remove(&address).ok_or(KeyringError::UnknownAccount(address))?;
        self.signing_locks.lock().remove(&address);
        debug!(address = ?address, "Account removed");
        Ok(())
    }

    pub fn clear_all(&self) {
        self.accounts.write().clear();
        self.signing_locks.lock().clear();
    }

    /// Write the full registry to the vault. The snapshot is taken after the
    /// vault's persist gate is held, so concurrent persists never drop an
    /// account registered in between.
    pub async fn persist(&self) -> Result<(), WalletError> {
        self.vault.persist_with(|| self.snapshot().map_err(WalletError::from)).await
    }

    /// Re-encrypt the current registry under a new password.
    pub async fn change_password(&self, new_password: SecretString) -> Result<(), WalletError> {
        let records = self.snapshot()?;
        self.vault.change_password(new_password, records).await?;
        Ok(())
    }
}
