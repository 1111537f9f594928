//! Error taxonomy for the vault, keyring, relay and signing layers.
//!
//! Every failure is surfaced to the immediate caller as a typed value; nothing
//! in the core retries or swallows these.

use ethers::types::Address;
use thiserror::Error;

/// Failures of the encrypted vault and its credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("no vault has been stored")]
    NoVault,
    #[error("no active credential; unlock or create the vault first")]
    NoCredential,
    #[error("encryption key was derived against an older vault generation")]
    StaleCredential,
    #[error("vault decryption failed")]
    DecryptionFailure,
    #[error("invalid encryption key format: {0}")]
    InvalidKeyFormat(String),
    #[error("vault unlock already in progress")]
    UnlockInProgress,
    #[error("a vault already exists")]
    VaultAlreadyExists,
    #[error("vault is locked")]
    Locked,
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("vault serialization error: {0}")]
    Serialization(String),
    #[error("vault persistence failed: {0}")]
    Persistence(String),
}

/// Failures talking to the relay (bundler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("relay unreachable: {0}")]
    Unreachable(String),
    #[error("entry point {0:?} is not supported by the relay")]
    UnsupportedEntryPoint(Address),
    #[error("entry point {0:?} has no deployed bytecode")]
    EntryPointNotDeployed(Address),
    #[error("gas estimation unavailable: {0}")]
    EstimationUnavailable(String),
    #[error("relay rejected the request: {0}")]
    Rejected(String),
}

/// Failures of the in-memory account registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyringError {
    #[error("unknown account implementation: {0}")]
    UnknownImplementation(String),
    #[error("unknown account: {0:?}")]
    UnknownAccount(Address),
    #[error("address derivation failed: {0}")]
    AddressDerivationFailed(String),
    #[error("duplicate account in keyring: {0:?}")]
    DuplicateAccount(Address),
    #[error("invalid account data: {0}")]
    InvalidAccountData(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("signing rejected by user")]
    SigningRejected,
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Failures of the network-access handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("unexpected rpc response: {0}")]
    Decode(String),
}

/// Crate-wide error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Keyring(#[from] KeyringError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Malformed caller input (addresses, quantities, call data).
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl WalletError {
    /// Whether the failure concerns key material or vault integrity.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            WalletError::Vault(VaultError::DecryptionFailure)
                | WalletError::Vault(VaultError::StaleCredential)
        )
    }

    /// Whether a caller may reasonably retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalletError::Relay(RelayError::Unreachable(_))
                | WalletError::Relay(RelayError::EstimationUnavailable(_))
                | WalletError::Chain(ChainError::Rpc(_))
        )
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::ValidationError(err.to_string())
    }
}
