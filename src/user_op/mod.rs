//! User operation model and construction pipeline.

pub mod builder;
pub mod gas;
pub mod quantity;
pub mod types;

pub use builder::UserOperationBuilder;
pub use gas::{calc_pre_verification_gas, merge_gas_estimate, GasOverheads};
pub use quantity::{parse_quantity, to_canonical_hex};
pub use types::{
    GasEstimate, ReceiptTransaction, RelayReceipt, SignedUserOperation, UnsignedUserOperation,
    UserOperationStatus,
};
