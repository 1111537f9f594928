//! Vault persistence
//!
//! `VaultStore` owns the encrypted vault and the active credential; the
//! storage medium is an external `VaultSink`.

use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::SecretString;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::errors::VaultError;
use crate::crypto::VaultEnvelope;

mod file;
pub mod vault;

pub use file::FileVaultSink;
pub use vault::{UnlockCredential, VaultStatus, VaultStore};

/// Everything produced by a successful persist.
#[derive(Debug, Clone)]
pub struct VaultUpdate {
    pub encrypted_vault: VaultEnvelope,
    /// Base64 export of the key the vault was encrypted with.
    pub exported_key: SecretString,
    pub salt: String,
}

/// Receives every successful persist and supplies the stored vault at startup.
#[async_trait]
pub trait VaultSink: Send + Sync {
    async fn load(&self) -> Result<Option<VaultEnvelope>, VaultError>;

    async fn store(&self, update: &VaultUpdate) -> Result<(), VaultError>;
}

/// Process-local sink. Keeps the whole update, exported key included, so it
/// is only suitable for session storage and tests.
#[derive(Debug, Default)]
pub struct MemoryVaultSink {
    latest: RwLock<Option<VaultUpdate>>,
    seeded: RwLock<Option<VaultEnvelope>>,
    writes: AtomicUsize,
}

impl MemoryVaultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that already holds `envelope`, as if written by an earlier session.
    pub fn with_vault(envelope: VaultEnvelope) -> Self {
        Self { seeded: RwLock::new(Some(envelope)), ..Self::default() }
    }

    pub fn latest(&self) -> Option<VaultUpdate> {
        self.latest.read().clone()
    }

    /// Number of successful `store` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VaultSink for MemoryVaultSink {
    async fn load(&self) -> Result<Option<VaultEnvelope>, VaultError> {
        if let Some(update) = self.latest.read().as_ref() {
            return Ok(Some(update.encrypted_vault.clone()));
        }
        Ok(self.seeded.read().clone())
    }

    async fn store(&self, update: &VaultUpdate) -> Result<(), VaultError> {
        *self.latest.write() = Some(update.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
