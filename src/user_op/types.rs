use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use super::quantity::canonical;

/// ERC-4337 user operation (EntryPoint v0.6 layout) before signing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedUserOperation {
    pub sender: Address,
    #[serde(with = "canonical")]
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    #[serde(with = "canonical")]
    pub call_gas_limit: U256,
    #[serde(with = "canonical")]
    pub verification_gas_limit: U256,
    #[serde(with = "canonical")]
    pub pre_verification_gas: U256,
    #[serde(with = "canonical")]
    pub max_fee_per_gas: U256,
    #[serde(with = "canonical")]
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
}

impl UnsignedUserOperation {
    fn field_tokens(&self, signature: &Bytes) -> Vec<Token> {
        vec![
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::Bytes(self.init_code.to_vec()),
            Token::Bytes(self.call_data.to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::Bytes(self.paymaster_and_data.to_vec()),
            Token::Bytes(signature.to_vec()),
        ]
    }

    /// ABI encoding of the whole operation including `signature`, as the
    /// entry point receives it in calldata.
    pub fn abi_encode_with_signature(&self, signature: &Bytes) -> Vec<u8> {
        encode(&self.field_tokens(signature))
    }

    /// Encoding covered by the signature: dynamic fields are replaced by
    /// their hashes and the signature itself is excluded.
    pub fn pack_for_hash(&self) -> Vec<u8> {
        encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ])
    }

    /// Operation hash as computed by `EntryPoint.getUserOpHash`.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let inner = keccak256(self.pack_for_hash());
        H256::from(keccak256(encode(&[
            Token::FixedBytes(inner.to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ])))
    }

    pub fn into_signed(self, signature: Bytes) -> SignedUserOperation {
        SignedUserOperation { op: self, signature }
    }
}

/// A user operation together with its signature. Read-only: changing any
/// field means building a new unsigned op and signing it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUserOperation {
    #[serde(flatten)]
    op: UnsignedUserOperation,
    signature: Bytes,
}

impl SignedUserOperation {
    pub fn op(&self) -> &UnsignedUserOperation {
        &self.op
    }

    pub fn signature(&self) -> &Bytes {
        &self.signature
    }

    pub fn sender(&self) -> Address {
        self.op.sender
    }

    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        self.op.hash(entry_point, chain_id)
    }

    pub fn into_unsigned(self) -> UnsignedUserOperation {
        self.op
    }
}

/// Relay gas estimate. Accepts hex or decimal quantities and the older
/// `verificationGas` field name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    #[serde(with = "canonical")]
    pub call_gas_limit: U256,
    #[serde(with = "canonical", alias = "verificationGas")]
    pub verification_gas_limit: U256,
    #[serde(with = "canonical")]
    pub pre_verification_gas: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UserOperationStatus {
    Pending,
    #[serde(rename_all = "camelCase")]
    Included { success: bool, transaction_hash: H256 },
}

/// Subset of `eth_getUserOperationReceipt` the wallet uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    pub user_op_hash: H256,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_gas_cost: Option<U256>,
    pub receipt: ReceiptTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptTransaction {
    pub transaction_hash: H256,
}

impl RelayReceipt {
    pub fn status(&self) -> UserOperationStatus {
        UserOperationStatus::Included {
            success: self.success,
            transaction_hash: self.receipt.transaction_hash,
        }
    }
}
