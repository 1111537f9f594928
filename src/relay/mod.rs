//! ERC-4337 relay (bundler) access.

use async_trait::async_trait;
use ethers::types::{Address, H256};
use tracing::info;

use crate::blockchain::ChainProvider;
use crate::core::errors::{RelayError, WalletError};
use crate::user_op::{GasEstimate, RelayReceipt, SignedUserOperation};

pub mod bundler;

pub use bundler::BundlerClient;

#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn supported_entry_points(&self) -> Result<Vec<Address>, RelayError>;

    async fn estimate_user_operation_gas(
        &self,
        op: &SignedUserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, RelayError>;

    /// Submit `op`; returns the user operation hash reported by the relay.
    async fn send_user_operation(
        &self,
        op: &SignedUserOperation,
        entry_point: Address,
    ) -> Result<H256, RelayError>;

    /// `None` while the operation is not yet included.
    async fn get_user_operation_receipt(&self, hash: H256) -> Result<Option<RelayReceipt>, RelayError>;
}

/// Startup checks: the relay serves `entry_point` and the entry point has
/// code on the connected chain.
pub async fn check_entry_point(
    relay: &dyn RelayClient,
    chain: &dyn ChainProvider,
    entry_point: Address,
) -> Result<(), WalletError> {
    let supported = relay.supported_entry_points().await?;
    if !supported.contains(&entry_point) {
        return Err(RelayError::UnsupportedEntryPoint(entry_point).into());
    }

    let code = chain.get_code(entry_point).await?;
    if code.is_empty() {
        return Err(RelayError::EntryPointNotDeployed(entry_point).into());
    }

    info!(entry_point = ?entry_point, "Relay entry point verified");
    Ok(())
}
