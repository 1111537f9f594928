use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, U256};
use sha3::{Digest, Keccak256};

use crate::core::errors::ChainError;

/// Compute the first 4 bytes (function selector) from a signature string, e.g. "transfer(address,uint256)".
pub fn selector_from_signature(signature: &str) -> [u8; 4] {
    let mut keccak = Keccak256::new();
    keccak.update(signature.as_bytes());
    let out = keccak.finalize();
    [out[0], out[1], out[2], out[3]]
}

/// Selector followed by the ABI encoding of `args`.
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let selector = selector_from_signature(signature);
    let body = encode(args);
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&selector);
    out.extend_from_slice(&body);
    Bytes::from(out)
}

/// Decode a single `address` return word. An empty return (no code at the
/// callee) decodes to the zero address.
pub fn decode_address_word(ret: &[u8]) -> Result<Address, ChainError> {
    match ret.len() {
        0 => Ok(Address::zero()),
        n if n >= 32 => Ok(Address::from_slice(&ret[12..32])),
        n => Err(ChainError::Decode(format!("address return too short: {} bytes", n))),
    }
}

/// Decode a single `uint256` return word; empty decodes to zero.
pub fn decode_uint_word(ret: &[u8]) -> Result<U256, ChainError> {
    match ret.len() {
        0 => Ok(U256::zero()),
        n if n >= 32 => Ok(U256::from_big_endian(&ret[..32])),
        n => Err(ChainError::Decode(format!("uint256 return too short: {} bytes", n))),
    }
}
