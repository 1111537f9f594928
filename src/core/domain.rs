use ethers::types::{Address, Bytes};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// One serialized signing identity as stored inside the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringRecord {
    /// Registry tag of the account implementation (e.g. "simple").
    pub implementation_type: String,
    pub address: Address,
    /// Opaque payload produced by `AccountSigner::serialize`.
    pub data: serde_json::Value,
}

/// A plain transaction the caller wants executed through a smart account.
///
/// Numeric fields are strings so callers may pass decimal or `0x` hex in any
/// padding; they are normalized by the user-operation pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionIntent {
    pub to: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_gas_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
}

impl TransactionIntent {
    /// Native value transfer with no call data.
    pub fn transfer(to: Address, value: impl Into<String>) -> Self {
        Self { to, value: Some(value.into()), ..Default::default() }
    }

    /// Contract call with optional attached value.
    pub fn call(to: Address, data: Bytes) -> Self {
        Self { to, data: Some(data), ..Default::default() }
    }
}

/// Per-call context passed to signing operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningContext {
    /// Outcome of an interactive confirmation; interactive account variants
    /// refuse to sign unless this is `Some(true)`.
    pub approved: Option<bool>,
}

impl SigningContext {
    pub fn approved() -> Self {
        Self { approved: Some(true) }
    }

    pub fn refused() -> Self {
        Self { approved: Some(false) }
    }
}

/// Optional inputs when creating a fresh account.
#[derive(Debug, Clone, Default)]
pub struct AccountContext {
    /// Import this owner key instead of generating one (hex, with or without 0x).
    pub private_key: Option<SecretString>,
    /// Factory salt; defaults to 0.
    pub index: Option<u64>,
}
