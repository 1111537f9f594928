//! Vault encryption service
//!
//! Password- and key-based AES-256-GCM encryption of opaque serialized
//! payloads. Keys are derived with the configured KDF; a derived key can be
//! exported (base64) and re-imported so an unlocked session can re-encrypt
//! without holding the password.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::core::errors::VaultError;
use crate::crypto::kdf::{KdfParams, KeyDerivation, KEY_LEN};

pub const NONCE_LEN: usize = 12;
pub const SALT_LEN: usize = 32;

/// Raw symmetric key. Zeroized on drop, never printed.
#[derive(Clone)]
pub struct EncryptionKey(Zeroizing<[u8; KEY_LEN]>);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Ciphertext plus nonce, without key-derivation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub iv: String,
}

/// At-rest vault format: `{ ciphertext, iv, salt, kdfParams }`, binary fields base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEnvelope {
    pub ciphertext: String,
    pub iv: String,
    pub salt: String,
    pub kdf_params: KdfParams,
}

impl VaultEnvelope {
    pub fn from_payload(payload: EncryptedPayload, salt: String, kdf_params: KdfParams) -> Self {
        Self { ciphertext: payload.ciphertext, iv: payload.iv, salt, kdf_params }
    }

    pub fn to_json(&self) -> Result<String, VaultError> {
        serde_json::to_string(self).map_err(|e| VaultError::Serialization(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, VaultError> {
        serde_json::from_str(raw).map_err(|e| VaultError::Serialization(e.to_string()))
    }
}

/// Encryption service for vault payloads.
#[derive(Debug, Clone)]
pub struct VaultEncryptor {
    kdf: KdfParams,
}

impl VaultEncryptor {
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf
    }

    /// Derive a key from `password` under a fresh salt and encrypt `plaintext`.
    /// Returns the envelope, the derived key and the base64 salt.
    pub fn derive_and_encrypt(
        &self,
        password: &SecretString,
        plaintext: &[u8],
    ) -> Result<(VaultEnvelope, EncryptionKey, String), VaultError> {
        let salt = KeyDerivation::generate_salt(SALT_LEN);
        let key = self.derive(password, &salt, &self.kdf)?;
        let payload = self.encrypt_with_key(&key, plaintext)?;
        let salt = STANDARD.encode(&salt);
        Ok((VaultEnvelope::from_payload(payload, salt.clone(), self.kdf.clone()), key, salt))
    }

    /// Encrypt with an already-derived key. Output: random 12-byte nonce + ciphertext.
    pub fn encrypt_with_key(
        &self,
        key: &EncryptionKey,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload, VaultError> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| VaultError::Encryption("Invalid key length".to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| VaultError::Encryption("Encryption failed".to_string()))?;

        Ok(EncryptedPayload { ciphertext: STANDARD.encode(ciphertext), iv: STANDARD.encode(nonce_bytes) })
    }

    /// Decrypt with a password, using the KDF parameters recorded in the envelope.
    pub fn decrypt_with_password(
        &self,
        password: &SecretString,
        envelope: &VaultEnvelope,
    ) -> Result<(Zeroizing<Vec<u8>>, EncryptionKey, String), VaultError> {
        let salt = decode_field(&envelope.salt)?;
        let key = self.derive(password, &salt, &envelope.kdf_params)?;
        let plaintext = self.decrypt_with_key(&key, envelope)?;
        Ok((plaintext, key, envelope.salt.clone()))
    }

    pub fn decrypt_with_key(
        &self,
        key: &EncryptionKey,
        envelope: &VaultEnvelope,
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        let iv: [u8; NONCE_LEN] = decode_field(&envelope.iv)?
            .try_into()
            .map_err(|_| VaultError::DecryptionFailure)?;
        let ciphertext = decode_field(&envelope.ciphertext)?;

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| VaultError::DecryptionFailure)?;
        let nonce = Nonce::from(iv);

        let plaintext = cipher
            .decrypt(&nonce, ciphertext.as_ref())
            .map_err(|_| VaultError::DecryptionFailure)?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Parse an exported key string. Deterministic and side-effect free.
    pub fn import_key(key_string: &str) -> Result<EncryptionKey, VaultError> {
        let raw = Zeroizing::new(
            STANDARD
                .decode(key_string.trim())
                .map_err(|e| VaultError::InvalidKeyFormat(e.to_string()))?,
        );
        let bytes: [u8; KEY_LEN] = raw.as_slice().try_into().map_err(|_| {
            VaultError::InvalidKeyFormat(format!("expected {} bytes, got {}", KEY_LEN, raw.len()))
        })?;
        Ok(EncryptionKey::from_bytes(bytes))
    }

    pub fn export_key(key: &EncryptionKey) -> SecretString {
        SecretString::new(STANDARD.encode(key.as_bytes()))
    }

    fn derive(
        &self,
        password: &SecretString,
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<EncryptionKey, VaultError> {
        let key = KeyDerivation::new(params.clone())
            .derive_key(password.expose_secret().as_bytes(), salt)?;
        Ok(EncryptionKey(key))
    }
}

impl Default for VaultEncryptor {
    fn default() -> Self {
        Self::new(KeyDerivation::default().params().clone())
    }
}

fn decode_field(field: &str) -> Result<Vec<u8>, VaultError> {
    STANDARD.decode(field).map_err(|_| VaultError::DecryptionFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encryptor() -> VaultEncryptor {
        VaultEncryptor::new(KdfParams::Pbkdf2Sha256 { iterations: 1_000 })
    }

    fn password(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    #[test]
    fn test_password_roundtrip() {
        let enc = encryptor();
        let (envelope, key, salt) = enc.derive_and_encrypt(&password("hunter22"), b"payload").unwrap();
        assert_eq!(envelope.salt, salt);

        let (plaintext, key2, salt2) = enc.decrypt_with_password(&password("hunter22"), &envelope).unwrap();
        assert_eq!(plaintext.as_slice(), b"payload");
        assert_eq!(key, key2);
        assert_eq!(salt, salt2);
    }

    #[test]
    fn test_wrong_password_fails_closed() {
        let enc = encryptor();
        let (envelope, _, _) = enc.derive_and_encrypt(&password("right"), b"payload").unwrap();
        let result = enc.decrypt_with_password(&password("wrong"), &envelope);
        assert!(matches!(result, Err(VaultError::DecryptionFailure)));
    }

    #[test]
    fn test_key_reuse_keeps_salt_external() {
        let enc = encryptor();
        let (envelope, key, salt) = enc.derive_and_encrypt(&password("pw"), b"first").unwrap();
        let payload = enc.encrypt_with_key(&key, b"second").unwrap();
        let next = VaultEnvelope::from_payload(payload, salt.clone(), envelope.kdf_params.clone());

        assert_eq!(enc.decrypt_with_key(&key, &next).unwrap().as_slice(), b"second");
        // still opens with the password because salt and params are unchanged
        let (plaintext, _, _) = enc.decrypt_with_password(&password("pw"), &next).unwrap();
        assert_eq!(plaintext.as_slice(), b"second");
    }

    #[test]
    fn test_export_import_key() {
        let enc = encryptor();
        let (envelope, key, _) = enc.derive_and_encrypt(&password("pw"), b"data").unwrap();
        let exported = VaultEncryptor::export_key(&key);
        let imported = VaultEncryptor::import_key(exported.expose_secret()).unwrap();
        assert_eq!(imported, key);
        assert_eq!(enc.decrypt_with_key(&imported, &envelope).unwrap().as_slice(), b"data");
    }

    #[test]
    fn test_import_key_rejects_malformed() {
        assert!(matches!(VaultEncryptor::import_key("***"), Err(VaultError::InvalidKeyFormat(_))));
        let short = STANDARD.encode([1u8; 16]);
        assert!(matches!(VaultEncryptor::import_key(&short), Err(VaultError::InvalidKeyFormat(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let enc = encryptor();
        let (mut envelope, key, _) = enc.derive_and_encrypt(&password("pw"), b"data").unwrap();
        let mut raw = STANDARD.decode(&envelope.ciphertext).unwrap();
        raw[0] ^= 0xff;
        envelope.ciphertext = STANDARD.encode(raw);
        assert!(matches!(enc.decrypt_with_key(&key, &envelope), Err(VaultError::DecryptionFailure)));
    }

    #[test]
    fn test_key_debug_redacted() {
        let key = EncryptionKey::from_bytes([7u8; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "EncryptionKey([REDACTED])");
    }

    #[test]
    fn test_envelope_json_roundtrip() {
        let enc = encryptor();
        let (envelope, _, _) = enc.derive_and_encrypt(&password("pw"), b"data").unwrap();
        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"kdfParams\""));
        assert_eq!(VaultEnvelope::from_json(&json).unwrap(), envelope);
    }
}
