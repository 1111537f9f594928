use ethers::types::{Bytes, U256};

use super::types::{GasEstimate, UnsignedUserOperation};

/// Calldata cost model used for `preVerificationGas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasOverheads {
    /// Fixed per-bundle overhead, shared by every op in the bundle.
    pub fixed: u64,
    pub per_user_op: u64,
    pub per_user_op_word: u64,
    pub zero_byte: u64,
    pub non_zero_byte: u64,
    pub bundle_size: u64,
}

impl Default for GasOverheads {
    fn default() -> Self {
        Self {
            fixed: 21_000,
            per_user_op: 18_300,
            per_user_op_word: 4,
            zero_byte: 4,
            non_zero_byte: 16,
            bundle_size: 1,
        }
    }
}

/// `preVerificationGas` for `op` when submitted with a signature the size of
/// `dummy_signature`. The op's own `preVerificationGas` does not influence
/// the result.
pub fn calc_pre_verification_gas(
    op: &UnsignedUserOperation,
    dummy_signature: &Bytes,
    overheads: &GasOverheads,
) -> U256 {
    let mut sized = op.clone();
    sized.pre_verification_gas = U256::from(overheads.fixed);
    let packed = sized.abi_encode_with_signature(dummy_signature);

    let call_data_cost: u64 = packed
        .iter()
        .map(|b| if *b == 0 { overheads.zero_byte } else { overheads.non_zero_byte })
        .sum();
    let words = (packed.len() as u64 + 31) / 32;

    U256::from(
        call_data_cost
            + overheads.fixed / overheads.bundle_size.max(1)
            + overheads.per_user_op
            + overheads.per_user_op_word * words,
    )
}

/// Raise the three gas limits of `op` to the relay's estimate where the
/// estimate is higher. Fees and every other field are left as they are.
pub fn merge_gas_estimate(mut op: UnsignedUserOperation, estimate: &GasEstimate) -> UnsignedUserOperation {
    op.call_gas_limit = op.call_gas_limit.max(estimate.call_gas_limit);
    op.verification_gas_limit = op.verification_gas_limit.max(estimate.verification_gas_limit);
    op.pre_verification_gas = op.pre_verification_gas.max(estimate.pre_verification_gas);
    op
}
