//! Numeric quantity normalization.
//!
//! Callers and relays hand us decimal strings, short hex, zero-padded hex and
//! plain JSON numbers. In memory everything is `U256`; on the wire it is
//! always `0x` followed by 64 lowercase hex digits.

use ethers::types::U256;

use crate::core::errors::WalletError;

/// Parse a decimal or `0x`-prefixed hex quantity with any amount of padding.
pub fn parse_quantity(raw: &str) -> Result<U256, WalletError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(WalletError::ValidationError("empty quantity".to_string()));
    }

    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        let digits = hex.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(U256::zero());
        }
        return U256::from_str_radix(digits, 16)
            .map_err(|e| WalletError::ValidationError(format!("invalid hex quantity '{}': {}", raw, e)));
    }

    U256::from_dec_str(raw)
        .map_err(|e| WalletError::ValidationError(format!("invalid decimal quantity '{}': {:?}", raw, e)))
}

pub fn to_canonical_hex(value: U256) -> String {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    format!("0x{}", hex::encode(buf))
}

/// Serde adapter: writes canonical hex, reads any representation
/// `parse_quantity` accepts as well as JSON integers.
pub mod canonical {
    use super::{parse_quantity, to_canonical_hex};
    use ethers::types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_canonical_hex(*value))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => parse_quantity(&s).map_err(de::Error::custom),
            Raw::Number(n) => Ok(U256::from(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(parse_quantity("21000").unwrap(), U256::from(21_000u64));
        assert_eq!(parse_quantity("0x5208").unwrap(), U256::from(21_000u64));
        assert_eq!(parse_quantity("0x0000000000005208").unwrap(), U256::from(21_000u64));
        assert_eq!(parse_quantity("0X5208").unwrap(), U256::from(21_000u64));
        assert_eq!(parse_quantity("0x").unwrap(), U256::zero());
        assert_eq!(parse_quantity(" 0x00 ").unwrap(), U256::zero());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("12abc").is_err());
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_quantity("-1").is_err());
    }

    #[test]
    fn test_canonical_width() {
        let s = to_canonical_hex(U256::from(0x5208u64));
        assert_eq!(s.len(), 66);
        assert!(s.ends_with("5208"));
        assert_eq!(s, s.to_lowercase());
    }

    proptest! {
        #[test]
        fn canonical_encoding_is_representation_independent(v in any::<u128>(), pad in 0usize..20) {
            let decimal = v.to_string();
            let hex = format!("0x{}{:x}", "0".repeat(pad), v);
            let a = parse_quantity(&decimal).unwrap();
            let b = parse_quantity(&hex).unwrap();
            prop_assert_eq!(to_canonical_hex(a), to_canonical_hex(b));
            prop_assert_eq!(parse_quantity(&to_canonical_hex(a)).unwrap(), a);
        }
    }
}
