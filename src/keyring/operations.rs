use ethers::types::{Address, Bytes, H256};
use tracing::{debug, info};

use super::{AccountQuote, KeyringManager};
use crate::core::domain::{SigningContext, TransactionIntent};
use crate::core::errors::WalletError;
use crate::user_op::{SignedUserOperation, UnsignedUserOperation, UserOperationStatus};

impl KeyringManager {
    /// Build a fully estimated, unsigned user operation for `address`.
    pub async fn create_unsigned_user_op(
        &self,
        address: Address,
        intent: &TransactionIntent,
        ctx: &SigningContext,
    ) -> Result<UnsignedUserOperation, WalletError> {
        let signer = self.get(address)?;
        self.builder.build(signer.as_ref(), intent, ctx).await
    }

    /// Like `create_unsigned_user_op` but stops at the signer's floors.
    pub async fn create_provisional_user_op(
        &self,
        address: Address,
        intent: &TransactionIntent,
        ctx: &SigningContext,
    ) -> Result<UnsignedUserOperation, WalletError> {
        let signer = self.get(address)?;
        self.builder.build_provisional(signer.as_ref(), intent, ctx).await
    }

    pub async fn sign_user_op(
        &self,
        address: Address,
        op: UnsignedUserOperation,
        ctx: &SigningContext,
    ) -> Result<SignedUserOperation, WalletError> {
        let signer = self.get(address)?;
        let lock = self.signing_lock(address);
        let _guard = lock.lock().await;
        signer.sign_user_operation(op, ctx).await
    }

    pub async fn sign_message(
        &self,
        address: Address,
        message: &[u8],
        ctx: &SigningContext,
    ) -> Result<Bytes, WalletError> {
        let signer = self.get(address)?;
        let lock = self.signing_lock(address);
        let _guard = lock.lock().await;
        signer.sign_message(message, ctx).await
    }

    /// Submit a signed operation through the relay.
    pub async fn send_user_op(
        &self,
        address: Address,
        op: &SignedUserOperation,
    ) -> Result<H256, WalletError> {
        self.get(address)?;
        if op.sender() != address {
            return Err(WalletError::ValidationError(format!(
                "operation sender {:?} does not match account {:?}",
                op.sender(),
                address
            )));
        }
        let hash = self.relay.send_user_operation(op, self.entry_point()).await?;
        info!(address = ?address, user_op_hash = ?hash, "User operation sent");
        Ok(hash)
    }

    /// Inclusion status from the relay, falling back to the entry point's
    /// event log when the relay has no receipt.
    pub async fn user_op_receipt(
        &self,
        address: Address,
        hash: H256,
    ) -> Result<UserOperationStatus, WalletError> {
        let signer = self.get(address)?;
        if let Some(receipt) = self.relay.get_user_operation_receipt(hash).await? {
            return Ok(receipt.status());
        }
        debug!(user_op_hash = ?hash, "No relay receipt; checking entry point logs");
        signer.get_user_operation_receipt(hash).await
    }

    pub async fn account_quote(&self, address: Address) -> Result<AccountQuote, WalletError> {
        let signer = self.get(address)?;
        let deployed = signer.is_deployed().await?;
        let creation_gas = signer.estimate_creation_gas().await?;
        let factory_data = signer.required_factory_data().await?;
        let balance = self.registry.environment().provider.get_balance(address).await?;
        Ok(AccountQuote {
            address,
            implementation_type: signer.implementation_type().to_string(),
            deployed,
            creation_gas,
            factory_data,
            balance,
        })
    }
}
