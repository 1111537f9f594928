use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, warn};

use super::gas::merge_gas_estimate;
use super::quantity::parse_quantity;
use super::types::UnsignedUserOperation;
use crate::accounts::AccountSigner;
use crate::core::domain::{SigningContext, TransactionIntent};
use crate::core::errors::{RelayError, WalletError};
use crate::relay::RelayClient;

/// Drives an intent through signer floors, relay estimation and merge.
#[derive(Clone)]
pub struct UserOperationBuilder {
    relay: Arc<dyn RelayClient>,
    entry_point: Address,
}

impl UserOperationBuilder {
    pub fn new(relay: Arc<dyn RelayClient>, entry_point: Address) -> Self {
        Self { relay, entry_point }
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Signer floors with the intent's explicit overrides applied; no relay
    /// round trip.
    pub async fn build_provisional(
        &self,
        signer: &dyn AccountSigner,
        intent: &TransactionIntent,
        ctx: &SigningContext,
    ) -> Result<UnsignedUserOperation, WalletError> {
        let op = signer.create_unsigned_user_operation(intent, ctx).await?;
        apply_overrides(op, intent)
    }

    /// Full pipeline. The three gas limits end up at `max(floor, estimate)`;
    /// fees stay at the signer's values. A relay failure is returned as
    /// `EstimationUnavailable` rather than falling back to the floors.
    pub async fn build(
        &self,
        signer: &dyn AccountSigner,
        intent: &TransactionIntent,
        ctx: &SigningContext,
    ) -> Result<UnsignedUserOperation, WalletError> {
        let provisional = self.build_provisional(signer, intent, ctx).await?;

        let probe = provisional.clone().into_signed(signer.dummy_signature());
        let estimate = self
            .relay
            .estimate_user_operation_gas(&probe, self.entry_point)
            .await
            .map_err(|e| {
                warn!(sender = ?provisional.sender, "Relay gas estimation failed: {}", e);
                let reason = match e {
                    RelayError::EstimationUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                RelayError::EstimationUnavailable(reason)
            })?;

        let merged = merge_gas_estimate(provisional, &estimate);
        debug!(
            sender = ?merged.sender,
            call_gas_limit = %merged.call_gas_limit,
            verification_gas_limit = %merged.verification_gas_limit,
            pre_verification_gas = %merged.pre_verification_gas,
            "User operation gas merged"
        );
        Ok(merged)
    }
}

fn apply_overrides(
    mut op: UnsignedUserOperation,
    intent: &TransactionIntent,
) -> Result<UnsignedUserOperation, WalletError> {
    if let Some(raw) = intent.call_gas_limit.as_deref() {
        op.call_gas_limit = parse_quantity(raw)?;
    }
    if let Some(raw) = intent.max_fee_per_gas.as_deref() {
        op.max_fee_per_gas = parse_quantity(raw)?;
    }
    if let Some(raw) = intent.max_priority_fee_per_gas.as_deref() {
        op.max_priority_fee_per_gas = parse_quantity(raw)?;
    }
    Ok(op)
}
