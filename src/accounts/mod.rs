//! Smart-account signers
//!
//! An `AccountSigner` owns the key material for one smart account and knows
//! how to turn a transaction intent into a user operation for it. Variants
//! are looked up by tag through `SignerRegistry`.

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::blockchain::ChainProvider;
use crate::core::domain::{AccountContext, SigningContext, TransactionIntent};
use crate::core::errors::{KeyringError, WalletError};
use crate::user_op::{SignedUserOperation, UnsignedUserOperation, UserOperationStatus};

pub mod approval;
pub mod simple;

pub use approval::ApprovalAccountSigner;
pub use simple::SimpleAccountSigner;

pub const SIMPLE_ACCOUNT: &str = "simple";
pub const APPROVAL_ACCOUNT: &str = "approval";

/// ECDSA-shaped placeholder (r, s, v) accepted by `ecrecover` without
/// reverting; used for size and gas estimation only.
pub const DUMMY_ECDSA_SIGNATURE: [u8; 65] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xf0,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x7a, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    0x1c,
];

/// Shared, non-owned dependencies handed to every signer.
#[derive(Clone)]
pub struct AccountEnvironment {
    pub provider: Arc<dyn ChainProvider>,
    pub entry_point: Address,
    pub factory: Address,
}

/// How a signer is brought to life.
#[derive(Debug, Clone)]
pub enum InitParams {
    /// New account, optionally importing an owner key.
    Fresh(Option<AccountContext>),
    /// Rebuild from the `data` of a stored `KeyringRecord`.
    Restore(serde_json::Value),
}

#[async_trait]
pub trait AccountSigner: Send + Sync {
    fn implementation_type(&self) -> &str;

    /// Load or create key material and derive the account address. May only
    /// succeed once per signer.
    async fn initialize(&mut self, params: InitParams) -> Result<(), WalletError>;

    /// Counterfactual account address; zero until initialized.
    fn address(&self) -> Address;

    async fn is_deployed(&self) -> Result<bool, WalletError>;

    /// Gas the factory needs to deploy the account; zero once deployed.
    async fn estimate_creation_gas(&self) -> Result<U256, WalletError>;

    /// `initCode` for the first user operation; empty once deployed.
    async fn required_factory_data(&self) -> Result<Bytes, WalletError>;

    /// Opaque payload stored in the vault and passed back to
    /// `initialize(InitParams::Restore(..))`.
    fn serialize(&self) -> Result<serde_json::Value, WalletError>;

    /// Provisional operation with the signer's gas floors and current fees.
    async fn create_unsigned_user_operation(
        &self,
        intent: &TransactionIntent,
        ctx: &SigningContext,
    ) -> Result<UnsignedUserOperation, WalletError>;

    async fn sign_user_operation(
        &self,
        op: UnsignedUserOperation,
        ctx: &SigningContext,
    ) -> Result<SignedUserOperation, WalletError>;

    async fn sign_message(&self, message: &[u8], ctx: &SigningContext) -> Result<Bytes, WalletError>;

    async fn get_user_operation_receipt(&self, hash: H256) -> Result<UserOperationStatus, WalletError>;

    fn dummy_signature(&self) -> Bytes {
        Bytes::from(DUMMY_ECDSA_SIGNATURE.to_vec())
    }
}

fn new_simple(env: AccountEnvironment) -> Box<dyn AccountSigner> {
    Box::new(SimpleAccountSigner::new(env))
}

fn new_approval(env: AccountEnvironment) -> Box<dyn AccountSigner> {
    Box::new(ApprovalAccountSigner::new(env))
}

pub type SignerConstructor = fn(AccountEnvironment) -> Box<dyn AccountSigner>;

/// Tag to constructor map used to build signers on `add` and `restore`.
#[derive(Clone)]
pub struct SignerRegistry {
    env: AccountEnvironment,
    constructors: HashMap<String, SignerConstructor>,
}

impl SignerRegistry {
    pub fn new(env: AccountEnvironment) -> Self {
        Self { env, constructors: HashMap::new() }
    }

    /// Registry with the built-in `simple` and `approval` variants.
    pub fn with_defaults(env: AccountEnvironment) -> Self {
        let mut registry = Self::new(env);
        registry.register(SIMPLE_ACCOUNT, new_simple);
        registry.register(APPROVAL_ACCOUNT, new_approval);
        registry
    }

    pub fn register(&mut self, tag: &str, constructor: SignerConstructor) {
        self.constructors.insert(tag.to_string(), constructor);
    }

    pub fn create(&self, tag: &str) -> Result<Box<dyn AccountSigner>, KeyringError> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| KeyringError::UnknownImplementation(tag.to_string()))?;
        Ok(constructor(self.env.clone()))
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.constructors.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn environment(&self) -> &AccountEnvironment {
        &self.env
    }
}
