use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, U256};
use serde::{Deserialize, Serialize};

use crate::core::errors::ChainError;

/// EIP-1559 fee suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeData {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Read-only network access shared by every account signer.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Deployed bytecode at `address`; empty when nothing is deployed.
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError>;

    /// Batch form of `get_code`, results in input order.
    async fn get_codes(&self, addresses: &[Address]) -> Result<Vec<Bytes>, ChainError> {
        futures::future::try_join_all(addresses.iter().map(|a| self.get_code(*a))).await
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    async fn estimate_gas(
        &self,
        from: Option<Address>,
        to: Address,
        data: Bytes,
    ) -> Result<U256, ChainError>;

    async fn fee_data(&self) -> Result<FeeData, ChainError>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError>;
}
