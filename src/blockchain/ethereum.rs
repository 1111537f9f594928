use async_trait::async_trait;
use ethers::{
    prelude::JsonRpcClient,
    providers::{Http, Middleware, Provider},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, Filter,
        Log, U256,
    },
};
use std::time::Duration;
use tracing::{debug, info};

use super::traits::{ChainProvider, FeeData};
use crate::core::errors::{ChainError, WalletError};

/// Builds the reqwest client shared by chain and relay transports: short
/// timeout, proxy taken from the environment.
pub(crate) fn http_transport(url: &str) -> Result<Http, WalletError> {
    let url = url.trim();
    let parsed_url = reqwest::Url::parse(url).map_err(|e| {
        WalletError::ConfigError(format!(
            "Invalid RPC URL '{}': {}. Please check config.toml or env vars.",
            url, e
        ))
    })?;

    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
    if let Ok(proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("HTTP_PROXY")) {
        if let Ok(p) = reqwest::Proxy::all(proxy) {
            builder = builder.proxy(p);
        }
    }
    let client = builder
        .build()
        .map_err(|e| WalletError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Http::new_with_client(parsed_url, client))
}

pub(crate) fn network_name(chain_id: u64) -> String {
    match chain_id {
        1 => "ethereum".to_string(),
        11155111 => "sepolia".to_string(),
        137 => "polygon".to_string(),
        80002 => "amoy".to_string(),
        8453 => "base".to_string(),
        84532 => "base-sepolia".to_string(),
        _ => format!("ethereum-{}", chain_id),
    }
}

/// `ChainProvider` over an ethers JSON-RPC provider.
#[derive(Clone)]
pub struct EthereumClient<P: JsonRpcClient + Clone = Http> {
    provider: Provider<P>,
    network_name: String,
    chain_id: u64,
}

impl EthereumClient<Http> {
    /// Connect and query the chain id.
    pub async fn connect(rpc_url: &str) -> Result<Self, WalletError> {
        let provider = Provider::new(http_transport(rpc_url)?);
        info!("Connecting to Ethereum network: {}", rpc_url.trim());

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| {
                ChainError::Rpc(format!(
                    "Failed to get chain ID from {}: {}. This might be due to a network issue, firewall, or an invalid RPC URL.",
                    rpc_url.trim(),
                    e
                ))
            })?
            .as_u64();

        let network_name = network_name(chain_id);
        info!("Connected to {} (Chain ID: {})", network_name, chain_id);
        Ok(Self { provider, network_name, chain_id })
    }

    /// Connect and insist the node reports `expected` as its chain id.
    pub async fn connect_with_chain_id(rpc_url: &str, expected: u64) -> Result<Self, WalletError> {
        let client = Self::connect(rpc_url).await?;
        if client.chain_id != expected {
            return Err(WalletError::ConfigError(format!(
                "RPC endpoint reports chain id {} but {} is configured",
                client.chain_id, expected
            )));
        }
        Ok(client)
    }
}

impl<P> EthereumClient<P>
where
    P: JsonRpcClient + Clone + Send + Sync,
{
    /// Wrap an existing provider, e.g. one over `MockProvider`.
    pub fn new_with_provider(provider: Provider<P>, chain_id: u64) -> Self {
        Self { provider, network_name: network_name(chain_id), chain_id }
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }
}

fn rpc_err(context: &str, e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(format!("{}: {}", context, e))
}

#[async_trait]
impl<P> ChainProvider for EthereumClient<P>
where
    P: JsonRpcClient + Clone + Send + Sync + 'static,
{
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainError> {
        debug!(address = ?address, "get_code");
        self.provider.get_code(address, None).await.map_err(|e| rpc_err("Failed to get code", e))
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        debug!(address = ?address, "get_balance");
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| rpc_err("Failed to get balance", e))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = Eip1559TransactionRequest::new().to(to).data(data).into();
        self.provider.call(&tx, None).await.map_err(|e| rpc_err("eth_call failed", e))
    }

    async fn estimate_gas(
        &self,
        from: Option<Address>,
        to: Address,
        data: Bytes,
    ) -> Result<U256, ChainError> {
        let mut request = Eip1559TransactionRequest::new().to(to).data(data);
        if let Some(from) = from {
            request = request.from(from);
        }
        let tx: TypedTransaction = request.into();
        let gas = self
            .provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| rpc_err("eth_estimateGas failed", e))?;
        debug!("estimate_gas got = 0x{:x}", gas);
        Ok(gas)
    }

    async fn fee_data(&self) -> Result<FeeData, ChainError> {
        let (max_fee_per_gas, max_priority_fee_per_gas) = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| rpc_err("Failed to estimate fees", e))?;
        debug!(
            max_fee = %max_fee_per_gas,
            max_priority_fee = %max_priority_fee_per_gas,
            "fee_data"
        );
        Ok(FeeData { max_fee_per_gas, max_priority_fee_per_gas })
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
        self.provider.get_logs(filter).await.map_err(|e| rpc_err("eth_getLogs failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{MockProvider, MockResponse};
    use serde_json::json;

    fn client() -> (EthereumClient<MockProvider>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        (EthereumClient::new_with_provider(provider, 11155111), mock)
    }

    #[tokio::test]
    async fn test_get_balance_from_mock() {
        let (client, mock) = client();
        mock.push_response(MockResponse::Value(json!(U256::from(1_000_000u64))));
        let balance = client.get_balance(Address::repeat_byte(1)).await.unwrap();
        assert_eq!(balance, U256::from(1_000_000u64));
    }

    #[tokio::test]
    async fn test_get_code_empty_and_deployed() {
        let (client, mock) = client();
        // MockProvider pops responses in LIFO order
        mock.push_response(MockResponse::Value(json!(Bytes::from(vec![0x60u8, 0x80]))));
        mock.push_response(MockResponse::Value(json!(Bytes::default())));

        let first = client.get_code(Address::repeat_byte(1)).await.unwrap();
        let second = client.get_code(Address::repeat_byte(2)).await.unwrap();
        assert!(first.is_empty());
        assert_eq!(second.to_vec(), vec![0x60u8, 0x80]);
    }

    #[tokio::test]
    async fn test_estimate_gas_and_network_name() {
        let (client, mock) = client();
        mock.push_response(MockResponse::Value(json!(U256::from(53_000u64))));
        let gas = client
            .estimate_gas(Some(Address::repeat_byte(9)), Address::repeat_byte(1), Bytes::default())
            .await
            .unwrap();
        assert_eq!(gas, U256::from(53_000u64));
        assert_eq!(client.network_name(), "sepolia");
        assert_eq!(client.chain_id().await.unwrap(), 11155111);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(http_transport("not a url"), Err(WalletError::ConfigError(_))));
    }
}
