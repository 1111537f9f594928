use async_trait::async_trait;
use ethers::{
    prelude::JsonRpcClient,
    providers::{Http, Provider, ProviderError, RpcError},
    types::{Address, H256},
};
use tracing::{debug, info};

use super::{check_entry_point, RelayClient};
use crate::blockchain::ethereum::http_transport;
use crate::blockchain::ChainProvider;
use crate::core::errors::{RelayError, WalletError};
use crate::user_op::{GasEstimate, RelayReceipt, SignedUserOperation};

/// JSON-RPC client for an ERC-4337 bundler.
#[derive(Clone)]
pub struct BundlerClient<P: JsonRpcClient + Clone = Http> {
    provider: Provider<P>,
}

impl BundlerClient<Http> {
    /// Build the transport without talking to the bundler.
    pub fn new(bundler_url: &str) -> Result<Self, WalletError> {
        Ok(Self { provider: Provider::new(http_transport(bundler_url)?) })
    }

    /// Build the transport and run the startup checks against `entry_point`.
    pub async fn connect(
        bundler_url: &str,
        entry_point: Address,
        chain: &dyn ChainProvider,
    ) -> Result<Self, WalletError> {
        let client = Self::new(bundler_url)?;
        info!("Connecting to bundler: {}", bundler_url.trim());
        check_entry_point(&client, chain, entry_point).await?;
        Ok(client)
    }
}

impl<P> BundlerClient<P>
where
    P: JsonRpcClient + Clone + Send + Sync,
{
    pub fn new_with_provider(provider: Provider<P>) -> Self {
        Self { provider }
    }
}

/// JSON-RPC error responses are the bundler refusing the request; anything
/// else is a transport problem.
fn classify(method: &str, e: ProviderError) -> RelayError {
    match e.as_error_response() {
        Some(resp) => RelayError::Rejected(format!("{}: {} ({})", method, resp.message, resp.code)),
        None => RelayError::Unreachable(format!("{}: {}", method, e)),
    }
}

#[async_trait]
impl<P> RelayClient for BundlerClient<P>
where
    P: JsonRpcClient + Clone + Send + Sync + 'static,
{
    async fn supported_entry_points(&self) -> Result<Vec<Address>, RelayError> {
        self.provider
            .request("eth_supportedEntryPoints", ())
            .await
            .map_err(|e| classify("eth_supportedEntryPoints", e))
    }

    async fn estimate_user_operation_gas(
        &self,
        op: &SignedUserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate, RelayError> {
        let estimate: GasEstimate = self
            .provider
            .request("eth_estimateUserOperationGas", (op, entry_point))
            .await
            .map_err(|e| classify("eth_estimateUserOperationGas", e))?;
        debug!(
            call_gas_limit = %estimate.call_gas_limit,
            verification_gas_limit = %estimate.verification_gas_limit,
            pre_verification_gas = %estimate.pre_verification_gas,
            "Relay gas estimate"
        );
        Ok(estimate)
    }

    async fn send_user_operation(
        &self,
        op: &SignedUserOperation,
        entry_point: Address,
    ) -> Result<H256, RelayError> {
        let hash: H256 = self
            .provider
            .request("eth_sendUserOperation", (op, entry_point))
            .await
            .map_err(|e| classify("eth_sendUserOperation", e))?;
        info!(sender = ?op.sender(), user_op_hash = ?hash, "User operation submitted");
        Ok(hash)
    }

    async fn get_user_operation_receipt(&self, hash: H256) -> Result<Option<RelayReceipt>, RelayError> {
        self.provider
            .request("eth_getUserOperationReceipt", [hash])
            .await
            .map_err(|e| classify("eth_getUserOperationReceipt", e))
    }
}
