use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use scrypt::Params;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::errors::VaultError;

pub const KEY_LEN: usize = 32;

/// Key derivation parameters, recorded in the vault envelope so a vault can
/// always be opened with the parameters it was written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all_fields = "camelCase")]
pub enum KdfParams {
    #[serde(rename = "pbkdf2-sha256")]
    Pbkdf2Sha256 { iterations: u32 },
    #[serde(rename = "scrypt")]
    Scrypt { log_n: u8, r: u32, p: u32 },
}

pub struct KeyDerivation {
    params: KdfParams,
}

impl KeyDerivation {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn pbkdf2(iterations: u32) -> Self {
        Self::new(KdfParams::Pbkdf2Sha256 { iterations })
    }

    pub fn scrypt(log_n: u8, r: u32, p: u32) -> Self {
        Self::new(KdfParams::Scrypt { log_n, r, p })
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    pub fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
        match &self.params {
            KdfParams::Pbkdf2Sha256 { iterations } => {
                debug!("Using PBKDF2 with {} iterations", iterations);
                let mut key = Zeroizing::new([0u8; KEY_LEN]);
                pbkdf2_hmac::<Sha256>(password, salt, *iterations, &mut key[..]);
                Ok(key)
            }
            KdfParams::Scrypt { log_n, r, p } => {
                debug!("Using Scrypt with parameters log_n={}, r={}, p={}", log_n, r, p);
                let params = Params::new(*log_n, *r, *p, KEY_LEN)
                    .map_err(|e| VaultError::Encryption(format!("invalid scrypt parameters: {}", e)))?;
                let mut key = Zeroizing::new([0u8; KEY_LEN]);
                scrypt::scrypt(password, salt, &params, &mut key[..])
                    .map_err(|e| VaultError::Encryption(format!("scrypt derivation failed: {}", e)))?;
                Ok(key)
            }
        }
    }

    pub fn generate_salt(length: usize) -> Vec<u8> {
        let mut salt = vec![0u8; length];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    }
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self::pbkdf2(600_000)
    }
}
