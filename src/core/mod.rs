pub mod abi;
pub mod config;
pub mod domain;
pub mod errors;

pub use config::WalletConfig;
pub use domain::{AccountContext, KeyringRecord, SigningContext, TransactionIntent};
pub use errors::{ChainError, KeyringError, RelayError, SigningError, VaultError, WalletError};
