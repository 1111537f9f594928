use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use tracing::warn;

use super::simple::SimpleAccountSigner;
use super::{AccountEnvironment, AccountSigner, InitParams, APPROVAL_ACCOUNT};
use crate::core::domain::{SigningContext, TransactionIntent};
use crate::core::errors::{SigningError, WalletError};
use crate::user_op::{SignedUserOperation, UnsignedUserOperation, UserOperationStatus};

/// Simple account that refuses to sign anything the user has not explicitly
/// approved in the signing context.
pub struct ApprovalAccountSigner {
    inner: SimpleAccountSigner,
}

impl ApprovalAccountSigner {
    pub fn new(env: AccountEnvironment) -> Self {
        Self { inner: SimpleAccountSigner::new(env) }
    }

    fn require_approval(&self, ctx: &SigningContext) -> Result<(), WalletError> {
        if ctx.approved == Some(true) {
            return Ok(());
        }
        warn!(address = ?self.inner.address(), "Signing request not approved");
        Err(SigningError::SigningRejected.into())
    }
}

#[async_trait]
impl AccountSigner for ApprovalAccountSigner {
    fn implementation_type(&self) -> &str {
        APPROVAL_ACCOUNT
    }

    async fn initialize(&mut self, params: InitParams) -> Result<(), WalletError> {
        self.inner.initialize(params).await
    }

    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn is_deployed(&self) -> Result<bool, WalletError> {
        self.inner.is_deployed().await
    }

    async fn estimate_creation_gas(&self) -> Result<U256, WalletError> {
        self.inner.estimate_creation_gas().await
    }

    async fn required_factory_data(&self) -> Result<Bytes, WalletError> {
        self.inner.required_factory_data().await
    }

    fn serialize(&self) -> Result<serde_json::Value, WalletError> {
        self.inner.serialize()
    }

    async fn create_unsigned_user_operation(
        &self,
        intent: &TransactionIntent,
        ctx: &SigningContext,
    ) -> Result<UnsignedUserOperation, WalletError> {
        self.inner.create_unsigned_user_operation(intent, ctx).await
    }

    async fn sign_user_operation(
        &self,
        op: UnsignedUserOperation,
        ctx: &SigningContext,
    ) -> Result<SignedUserOperation, WalletError> {
        self.require_approval(ctx)?;
        self.inner.sign_op(op).await
    }

    async fn sign_message(&self, message: &[u8], ctx: &SigningContext) -> Result<Bytes, WalletError> {
        self.require_approval(ctx)?;
        self.inner.sign_raw_message(message).await
    }

    async fn get_user_operation_receipt(&self, hash: H256) -> Result<UserOperationStatus, WalletError> {
        self.inner.get_user_operation_receipt(hash).await
    }
}
