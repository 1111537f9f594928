//! eth-infinitism `SimpleAccount` signer.
//!
//! One secp256k1 owner key per account. The account address is the
//! factory's counterfactual `getAddress(owner, salt)`; the first user
//! operation deploys it through `createAccount(owner, salt)`.

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Filter, H256, U256};
use ethers::utils::keccak256;
use rand::rngs::OsRng;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AccountEnvironment, AccountSigner, InitParams, SIMPLE_ACCOUNT};
use crate::core::abi::{decode_address_word, decode_uint_word, encode_call};
use crate::core::domain::{SigningContext, TransactionIntent};
use crate::core::errors::{KeyringError, SigningError, WalletError};
use crate::user_op::gas::{calc_pre_verification_gas, GasOverheads};
use crate::user_op::quantity::parse_quantity;
use crate::user_op::{SignedUserOperation, UnsignedUserOperation, UserOperationStatus};

const CREATE_ACCOUNT: &str = "createAccount(address,uint256)";
const GET_ADDRESS: &str = "getAddress(address,uint256)";
const EXECUTE: &str = "execute(address,uint256,bytes)";
const GET_NONCE: &str = "getNonce(address,uint192)";
const USER_OPERATION_EVENT: &str =
    "UserOperationEvent(bytes32,address,address,uint256,bool,uint256,uint256)";

/// Verification gas for the account's `validateUserOp`, before deployment cost.
pub const BASE_VERIFICATION_GAS: u64 = 100_000;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimpleAccountData {
    private_key: String,
    index: u64,
    factory: Address,
}

pub struct SimpleAccountSigner {
    env: AccountEnvironment,
    owner: Option<LocalWallet>,
    index: u64,
    factory: Address,
    address: Address,
}

impl SimpleAccountSigner {
    pub fn new(env: AccountEnvironment) -> Self {
        let factory = env.factory;
        Self { env, owner: None, index: 0, factory, address: Address::zero() }
    }

    pub fn owner_address(&self) -> Option<Address> {
        self.owner.as_ref().map(|w| w.address())
    }

    fn owner(&self) -> Result<&LocalWallet, WalletError> {
        self.owner
            .as_ref()
            .ok_or_else(|| KeyringError::InvalidAccountData("account not initialized".into()).into())
    }

    fn create_account_call(&self, owner: Address) -> Bytes {
        encode_call(CREATE_ACCOUNT, &[Token::Address(owner), Token::Uint(U256::from(self.index))])
    }

    fn init_code(&self, owner: Address) -> Bytes {
        let call = self.create_account_call(owner);
        let mut code = Vec::with_capacity(20 + call.len());
        code.extend_from_slice(self.factory.as_bytes());
        code.extend_from_slice(&call);
        Bytes::from(code)
    }

    async fn counterfactual_address(&self, owner: Address) -> Result<Address, WalletError> {
        let data =
            encode_call(GET_ADDRESS, &[Token::Address(owner), Token::Uint(U256::from(self.index))]);
        let ret = self.env.provider.call(self.factory, data).await?;
        Ok(decode_address_word(&ret)?)
    }

    async fn nonce(&self, deployed: bool) -> Result<U256, WalletError> {
        if !deployed {
            return Ok(U256::zero());
        }
        let data =
            encode_call(GET_NONCE, &[Token::Address(self.address), Token::Uint(U256::zero())]);
        let ret = self.env.provider.call(self.env.entry_point, data).await?;
        Ok(decode_uint_word(&ret)?)
    }

    /// Inner signing step shared with interactive variants; performs no
    /// approval check.
    pub(crate) async fn sign_op(
        &self,
        op: UnsignedUserOperation,
    ) -> Result<SignedUserOperation, WalletError> {
        if op.sender != self.address {
            return Err(SigningError::SigningFailed(format!(
                "operation sender {:?} is not this account",
                op.sender
            ))
            .into());
        }
        let chain_id = self.env.provider.chain_id().await?;
        let hash = op.hash(self.env.entry_point, chain_id);
        let signature = self
            .owner()?
            .sign_message(hash.as_bytes())
            .await
            .map_err(|e| SigningError::SigningFailed(e.to_string()))?;
        debug!(address = ?self.address, user_op_hash = ?hash, "Signed user operation");
        Ok(op.into_signed(Bytes::from(signature.to_vec())))
    }

    pub(crate) async fn sign_raw_message(&self, message: &[u8]) -> Result<Bytes, WalletError> {
        let signature = self
            .owner()?
            .sign_message(message)
            .await
            .map_err(|e| SigningError::SigningFailed(e.to_string()))?;
        Ok(Bytes::from(signature.to_vec()))
    }
}

#[async_trait]
impl AccountSigner for SimpleAccountSigner {
    fn implementation_type(&self) -> &str {
        SIMPLE_ACCOUNT
    }

    async fn initialize(&mut self, params: InitParams) -> Result<(), WalletError> {
        if self.owner.is_some() {
            return Err(KeyringError::InvalidAccountData("account already initialized".into()).into());
        }

        let owner = match params {
            InitParams::Fresh(ctx) => {
                let ctx = ctx.unwrap_or_default();
                self.index = ctx.index.unwrap_or(0);
                match ctx.private_key {
                    Some(key) => key.expose_secret().trim().parse::<LocalWallet>().map_err(|e| {
                        KeyringError::InvalidAccountData(format!("invalid owner key: {}", e))
                    })?,
                    None => LocalWallet::new(&mut OsRng),
                }
            }
            InitParams::Restore(value) => {
                let data: SimpleAccountData = serde_json::from_value(value)
                    .map_err(|e| KeyringError::InvalidAccountData(e.to_string()))?;
                self.index = data.index;
                self.factory = data.factory;
                data.private_key.parse::<LocalWallet>().map_err(|e| {
                    KeyringError::InvalidAccountData(format!("invalid owner key: {}", e))
                })?
            }
        };

        self.address = self.counterfactual_address(owner.address()).await?;
        self.owner = Some(owner);
        info!(address = ?self.address, index = self.index, "Simple account initialized");
        Ok(())
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn is_deployed(&self) -> Result<bool, WalletError> {
        let code = self.env.provider.get_code(self.address).await?;
        Ok(!code.is_empty())
    }

    async fn estimate_creation_gas(&self) -> Result<U256, WalletError> {
        if self.is_deployed().await? {
            return Ok(U256::zero());
        }
        let owner = self.owner()?.address();
        let gas = self
            .env
            .provider
            .estimate_gas(None, self.factory, self.create_account_call(owner))
            .await?;
        Ok(gas)
    }

    async fn required_factory_data(&self) -> Result<Bytes, WalletError> {
        if self.is_deployed().await? {
            return Ok(Bytes::default());
        }
        Ok(self.init_code(self.owner()?.address()))
    }

    fn serialize(&self) -> Result<serde_json::Value, WalletError> {
        let owner = self.owner()?;
        let data = SimpleAccountData {
            private_key: format!("0x{}", hex::encode(owner.signer().to_bytes())),
            index: self.index,
            factory: self.factory,
        };
        serde_json::to_value(data).map_err(|e| KeyringError::InvalidAccountData(e.to_string()).into())
    }

    async fn create_unsigned_user_operation(
        &self,
        intent: &TransactionIntent,
        _ctx: &SigningContext,
    ) -> Result<UnsignedUserOperation, WalletError> {
        let owner = self.owner()?.address();
        let deployed = self.is_deployed().await?;

        let value = match intent.value.as_deref() {
            Some(v) => parse_quantity(v)?,
            None => U256::zero(),
        };
        let call_data = encode_call(
            EXECUTE,
            &[
                Token::Address(intent.to),
                Token::Uint(value),
                Token::Bytes(intent.data.clone().unwrap_or_default().to_vec()),
            ],
        );

        let (init_code, creation_gas) = if deployed {
            (Bytes::default(), U256::zero())
        } else {
            let gas = self
                .env
                .provider
                .estimate_gas(None, self.factory, self.create_account_call(owner))
                .await?;
            (self.init_code(owner), gas)
        };

        let nonce = self.nonce(deployed).await?;
        let call_gas_limit = self
            .env
            .provider
            .estimate_gas(Some(self.env.entry_point), self.address, call_data.clone())
            .await?;
        let fees = self.env.provider.fee_data().await?;

        let mut op = UnsignedUserOperation {
            sender: self.address,
            nonce,
            init_code,
            call_data,
            call_gas_limit,
            verification_gas_limit: U256::from(BASE_VERIFICATION_GAS) + creation_gas,
            pre_verification_gas: U256::zero(),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            paymaster_and_data: Bytes::default(),
        };
        op.pre_verification_gas =
            calc_pre_verification_gas(&op, &self.dummy_signature(), &GasOverheads::default());

        debug!(
            address = ?self.address,
            deployed,
            call_gas_limit = %op.call_gas_limit,
            verification_gas_limit = %op.verification_gas_limit,
            pre_verification_gas = %op.pre_verification_gas,
            "Provisional user operation"
        );
        Ok(op)
    }

    async fn sign_user_operation(
        &self,
        op: UnsignedUserOperation,
        _ctx: &SigningContext,
    ) -> Result<SignedUserOperation, WalletError> {
        self.sign_op(op).await
    }

    async fn sign_message(&self, message: &[u8], _ctx: &SigningContext) -> Result<Bytes, WalletError> {
        self.sign_raw_message(message).await
    }

    async fn get_user_operation_receipt(&self, hash: H256) -> Result<UserOperationStatus, WalletError> {
        let filter = Filter::new()
            .address(self.env.entry_point)
            .event(USER_OPERATION_EVENT)
            .topic1(hash)
            .from_block(0u64);
        let logs = self.env.provider.get_logs(&filter).await?;

        let Some(log) = logs.into_iter().next() else {
            return Ok(UserOperationStatus::Pending);
        };
        // data: nonce, success, actualGasCost, actualGasUsed
        let success = log.data.get(32..64).map(|w| w.iter().any(|b| *b != 0)).unwrap_or(false);
        Ok(UserOperationStatus::Included {
            success,
            transaction_hash: log.transaction_hash.unwrap_or_default(),
        })
    }
}

/// Topic0 of the entry point's `UserOperationEvent`.
pub fn user_operation_event_topic() -> H256 {
    H256::from(keccak256(USER_OPERATION_EVENT.as_bytes()))
}
