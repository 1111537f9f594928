//! Encrypted keyring vault
//!
//! Lifecycle is `Locked -> Unlocking -> Unlocked`, back to `Locked` on
//! `lock`/`clear`. Persists are serialized through a gate owned by the store
//! and the write itself runs in a detached task, so a caller that stops
//! polling cannot leave the sink and the in-memory state disagreeing.

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{VaultSink, VaultUpdate};
use crate::core::domain::KeyringRecord;
use crate::core::errors::VaultError;
use crate::crypto::{EncryptionKey, KdfParams, VaultEncryptor, VaultEnvelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultStatus {
    Locked,
    Unlocking,
    Unlocked,
}

/// What a caller supplies to open the vault.
pub enum UnlockCredential {
    Password(SecretString),
    /// Exported key string plus the salt it was derived under.
    Key { key: SecretString, salt: String },
}

impl std::fmt::Debug for UnlockCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password([REDACTED])"),
            Self::Key { salt, .. } => write!(f, "Key {{ key: [REDACTED], salt: {} }}", salt),
        }
    }
}

#[derive(Clone)]
enum CredentialState {
    Locked,
    Password(SecretString),
    Key { key: EncryptionKey, salt: String, kdf: KdfParams },
}

struct VaultState {
    status: VaultStatus,
    envelope: Option<VaultEnvelope>,
    credential: CredentialState,
    records: Vec<KeyringRecord>,
    exported: Option<(SecretString, String)>,
}

impl VaultState {
    fn reset(&mut self) {
        self.status = VaultStatus::Locked;
        self.credential = CredentialState::Locked;
        self.records.clear();
        self.exported = None;
    }
}

/// Owner of the encrypted vault and the active credential.
#[derive(Clone)]
pub struct VaultStore {
    state: Arc<RwLock<VaultState>>,
    persist_gate: Arc<Mutex<()>>,
    sink: Arc<dyn VaultSink>,
    encryptor: VaultEncryptor,
}

impl VaultStore {
    /// Open the store, reading any previously stored vault from `sink`.
    pub async fn open(sink: Arc<dyn VaultSink>, encryptor: VaultEncryptor) -> Result<Self, VaultError> {
        let envelope = sink.load().await?;
        debug!(has_vault = envelope.is_some(), "Vault store opened");
        Ok(Self {
            state: Arc::new(RwLock::new(VaultState {
                status: VaultStatus::Locked,
                envelope,
                credential: CredentialState::Locked,
                records: Vec::new(),
                exported: None,
            })),
            persist_gate: Arc::new(Mutex::new(())),
            sink,
            encryptor,
        })
    }

    pub fn status(&self) -> VaultStatus {
        self.state.read().status
    }

    pub fn is_unlocked(&self) -> bool {
        self.status() == VaultStatus::Unlocked
    }

    pub fn has_vault(&self) -> bool {
        self.state.read().envelope.is_some()
    }

    /// Records from the last unlock or persist; empty while locked.
    pub fn records(&self) -> Vec<KeyringRecord> {
        self.state.read().records.clone()
    }

    /// Exported key and salt of the active session, for unlocking later
    /// without the password.
    pub fn export_encryption_key(&self) -> Option<(SecretString, String)> {
        let state = self.state.read();
        if state.status != VaultStatus::Unlocked {
            return None;
        }
        state.exported.clone()
    }

    pub async fn unlock(&self, credential: UnlockCredential) -> Result<Vec<KeyringRecord>, VaultError> {
        let guard = UnlockingGuard::begin(&self.state)?;
        let envelope = self.state.read().envelope.clone().ok_or(VaultError::NoVault)?;

        let (plaintext, key, salt) = match credential {
            UnlockCredential::Password(password) => {
                let encryptor = self.encryptor.clone();
                let envelope = envelope.clone();
                tokio::task::spawn_blocking(move || encryptor.decrypt_with_password(&password, &envelope))
                    .await
                    .map_err(|e| VaultError::Encryption(e.to_string()))??
            }
            UnlockCredential::Key { key, salt } => {
                if salt != envelope.salt {
                    warn!("Unlock key salt does not match stored vault");
                    return Err(VaultError::StaleCredential);
                }
                let key = VaultEncryptor::import_key(key.expose_secret())?;
                let plaintext = self.encryptor.decrypt_with_key(&key, &envelope)?;
                (plaintext, key, salt)
            }
        };

        let records: Vec<KeyringRecord> = serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::Serialization(e.to_string()))?;

        let exported = (VaultEncryptor::export_key(&key), salt.clone());
        let credential = CredentialState::Key { key, salt, kdf: envelope.kdf_params.clone() };
        guard.complete(credential, records.clone(), exported)?;

        info!(accounts = records.len(), "Vault unlocked");
        Ok(records)
    }

    /// Encrypt and store `records` under the active credential.
    pub async fn persist(&self, records: Vec<KeyringRecord>) -> Result<(), VaultError> {
        self.persist_with(move || Ok::<_, VaultError>(records)).await
    }

    /// Like `persist`, with the record set taken by `snapshot` once this
    /// persist holds the gate. A failing snapshot aborts without writing,
    /// and `snapshot` never runs if the vault has no credential.
    pub async fn persist_with<F, E>(&self, snapshot: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<Vec<KeyringRecord>, E>,
        E: From<VaultError>,
    {
        let gate = self.persist_gate.clone().lock_owned().await;
        let credential = self.state.read().credential.clone();
        if matches!(credential, CredentialState::Locked) {
            return Err(VaultError::NoCredential.into());
        }
        let records = snapshot()?;
        self.write_under_gate(gate, credential, records, false).await.map_err(E::from)
    }

    /// First-time setup. Fails if a vault already exists.
    pub async fn create_new_vault(
        &self,
        password: SecretString,
        records: Vec<KeyringRecord>,
    ) -> Result<(), VaultError> {
        let gate = self.persist_gate.clone().lock_owned().await;
        {
            let state = self.state.read();
            if state.envelope.is_some() {
                return Err(VaultError::VaultAlreadyExists);
            }
            if state.status == VaultStatus::Unlocking {
                return Err(VaultError::UnlockInProgress);
            }
        }
        self.write_under_gate(gate, CredentialState::Password(password), records, true).await?;
        info!("New vault created");
        Ok(())
    }

    /// Check `password` against the stored vault without changing state.
    pub async fn verify_password(&self, password: &SecretString) -> Result<(), VaultError> {
        let envelope = self.state.read().envelope.clone().ok_or(VaultError::NoVault)?;
        let encryptor = self.encryptor.clone();
        let password = password.clone();
        tokio::task::spawn_blocking(move || encryptor.decrypt_with_password(&password, &envelope))
            .await
            .map_err(|e| VaultError::Encryption(e.to_string()))??;
        Ok(())
    }

    /// Re-encrypt `records` under `new_password` with a fresh salt. Previously
    /// exported keys stop working.
    pub async fn change_password(
        &self,
        new_password: SecretString,
        records: Vec<KeyringRecord>,
    ) -> Result<(), VaultError> {
        let gate = self.persist_gate.clone().lock_owned().await;
        if self.status() != VaultStatus::Unlocked {
            return Err(VaultError::Locked);
        }
        self.write_under_gate(gate, CredentialState::Password(new_password), records, true).await?;
        info!("Vault password changed");
        Ok(())
    }

    /// Forget the credential and cached records. The stored vault is untouched.
    pub fn clear(&self) {
        self.state.write().reset();
        debug!("Vault credential cleared");
    }

    pub fn lock(&self) {
        self.clear();
        info!("Vault locked");
    }

    async fn write_under_gate(
        &self,
        gate: OwnedMutexGuard<()>,
        credential: CredentialState,
        records: Vec<KeyringRecord>,
        install: bool,
    ) -> Result<(), VaultError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(&records).map_err(|e| VaultError::Serialization(e.to_string()))?,
        );
        let encryptor = self.encryptor.clone();
        let sink = self.sink.clone();
        let state = self.state.clone();

        let task = tokio::spawn(async move {
            let _gate = gate;
            let build_credential = credential.clone();
            let (envelope, exported) = tokio::task::spawn_blocking(move || {
                seal(&encryptor, &build_credential, &plaintext)
            })
            .await
            .map_err(|e| VaultError::Encryption(e.to_string()))??;

            let update = VaultUpdate {
                encrypted_vault: envelope.clone(),
                exported_key: exported.0.clone(),
                salt: exported.1.clone(),
            };
            sink.store(&update).await?;

            let mut state = state.write();
            state.envelope = Some(envelope);
            if install {
                state.status = VaultStatus::Unlocked;
                state.credential = credential;
                state.records = records;
                state.exported = Some(exported);
            } else if state.status == VaultStatus::Unlocked {
                state.records = records;
                state.exported = Some(exported);
            }
            Ok::<_, VaultError>(())
        });

        task.await.map_err(|e| VaultError::Persistence(e.to_string()))??;
        debug!("Vault persisted");
        Ok(())
    }
}

/// Build an envelope for `plaintext`. Password credentials derive under a
/// fresh salt; key credentials reuse theirs.
fn seal(
    encryptor: &VaultEncryptor,
    credential: &CredentialState,
    plaintext: &[u8],
) -> Result<(VaultEnvelope, (SecretString, String)), VaultError> {
    match credential {
        CredentialState::Locked => Err(VaultError::NoCredential),
        CredentialState::Password(password) => {
            let (envelope, key, salt) = encryptor.derive_and_encrypt(password, plaintext)?;
            Ok((envelope, (VaultEncryptor::export_key(&key), salt)))
        }
        CredentialState::Key { key, salt, kdf } => {
            let payload = encryptor.encrypt_with_key(key, plaintext)?;
            let envelope = VaultEnvelope::from_payload(payload, salt.clone(), kdf.clone());
            Ok((envelope, (VaultEncryptor::export_key(key), salt.clone())))
        }
    }
}

/// Holds the store in `Unlocking`. Dropped without `complete` it returns the
/// store to `Locked` with no credential.
struct UnlockingGuard<'a> {
    state: &'a RwLock<VaultState>,
    completed: bool,
}

impl<'a> UnlockingGuard<'a> {
    fn begin(state: &'a RwLock<VaultState>) -> Result<Self, VaultError> {
        let mut st = state.write();
        if st.status == VaultStatus::Unlocking {
            return Err(VaultError::UnlockInProgress);
        }
        st.reset();
        st.status = VaultStatus::Unlocking;
        Ok(Self { state, completed: false })
    }

    fn complete(
        mut self,
        credential: CredentialState,
        records: Vec<KeyringRecord>,
        exported: (SecretString, String),
    ) -> Result<(), VaultError> {
        let mut st = self.state.write();
        // locked while we were decrypting
        if st.status != VaultStatus::Unlocking {
            return Err(VaultError::Locked);
        }
        st.status = VaultStatus::Unlocked;
        st.credential = credential;
        st.records = records;
        st.exported = Some(exported);
        self.completed = true;
        Ok(())
    }
}

impl Drop for UnlockingGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut st = self.state.write();
        if st.status == VaultStatus::Unlocking {
            st.reset();
        }
    }
}
