use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::errors::WalletError;
use crate::crypto::kdf::KdfParams;

/// EntryPoint v0.6 canonical deployment.
pub const DEFAULT_ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
/// eth-infinitism SimpleAccountFactory for EntryPoint v0.6.
pub const DEFAULT_SIMPLE_ACCOUNT_FACTORY: &str = "0x9406Cc6185a346906296840746125a0E44976454";

/// Key derivation algorithm used for newly written vaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfKind {
    Pbkdf2,
    Scrypt,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "SecurityConfig::default_kdf")]
    pub kdf: KdfKind,

    /// PBKDF2 iteration count
    #[serde(default = "SecurityConfig::default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,

    /// Scrypt cost parameters (N = 2^log_n)
    #[serde(default = "SecurityConfig::default_scrypt_log_n")]
    pub scrypt_log_n: u8,
    #[serde(default = "SecurityConfig::default_scrypt_r")]
    pub scrypt_r: u32,
    #[serde(default = "SecurityConfig::default_scrypt_p")]
    pub scrypt_p: u32,
}

impl SecurityConfig {
    fn default_kdf() -> KdfKind { KdfKind::Pbkdf2 }
    fn default_pbkdf2_iterations() -> u32 { 600_000 }
    fn default_scrypt_log_n() -> u8 { 17 }
    fn default_scrypt_r() -> u32 { 8 }
    fn default_scrypt_p() -> u32 { 1 }

    /// Parameters recorded in every vault written under this configuration.
    pub fn kdf_params(&self) -> KdfParams {
        match self.kdf {
            KdfKind::Pbkdf2 => KdfParams::Pbkdf2Sha256 { iterations: self.pbkdf2_iterations },
            KdfKind::Scrypt => {
                KdfParams::Scrypt { log_n: self.scrypt_log_n, r: self.scrypt_r, p: self.scrypt_p }
            }
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            kdf: Self::default_kdf(),
            pbkdf2_iterations: Self::default_pbkdf2_iterations(),
            scrypt_log_n: Self::default_scrypt_log_n(),
            scrypt_r: Self::default_scrypt_r(),
            scrypt_p: Self::default_scrypt_p(),
        }
    }
}

/// Blockchain network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// Expected chain id; checked against the node at startup when set.
    #[serde(default)]
    pub chain_id: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { rpc_url: "http://127.0.0.1:8545".to_string(), chain_id: None }
    }
}

/// Relay (bundler) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub bundler_url: String,
    #[serde(default = "RelayConfig::default_entry_point")]
    pub entry_point: Address,
}

impl RelayConfig {
    fn default_entry_point() -> Address {
        Address::from_str(DEFAULT_ENTRY_POINT).unwrap_or_default()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bundler_url: "http://127.0.0.1:3000/rpc".to_string(),
            entry_point: Self::default_entry_point(),
        }
    }
}

/// Account implementation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default = "AccountsConfig::default_factory")]
    pub simple_account_factory: Address,
}

impl AccountsConfig {
    fn default_factory() -> Address {
        Address::from_str(DEFAULT_SIMPLE_ACCOUNT_FACTORY).unwrap_or_default()
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self { simple_account_factory: Self::default_factory() }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub vault_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { vault_path: PathBuf::from("./data/vault.json") }
    }
}

/// Top-level wallet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl WalletConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, WalletError> {
        toml::from_str(raw).map_err(|e| WalletError::ConfigError(format!("invalid config: {}", e)))
    }

    /// Load a TOML file, then apply `WALLET_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WalletError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), WalletError> {
        if let Ok(url) = std::env::var("WALLET_RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Ok(url) = std::env::var("WALLET_BUNDLER_URL") {
            self.relay.bundler_url = url;
        }
        if let Ok(entry_point) = std::env::var("WALLET_ENTRY_POINT") {
            self.relay.entry_point = Address::from_str(entry_point.trim()).map_err(|e| {
                WalletError::ConfigError(format!("invalid WALLET_ENTRY_POINT: {}", e))
            })?;
        }
        if let Ok(path) = std::env::var("WALLET_VAULT_PATH") {
            self.storage.vault_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        for (name, url) in [("network.rpc_url", &self.network.rpc_url), ("relay.bundler_url", &self.relay.bundler_url)] {
            reqwest::Url::parse(url.trim())
                .map_err(|e| WalletError::ConfigError(format!("{} '{}' is invalid: {}", name, url, e)))?;
        }
        if self.relay.entry_point.is_zero() {
            return Err(WalletError::ConfigError("relay.entry_point must be set".into()));
        }
        if self.accounts.simple_account_factory.is_zero() {
            return Err(WalletError::ConfigError("accounts.simple_account_factory must be set".into()));
        }
        if self.security.kdf == KdfKind::Pbkdf2 && self.security.pbkdf2_iterations == 0 {
            return Err(WalletError::ConfigError("security.pbkdf2_iterations must be positive".into()));
        }
        Ok(())
    }
}
