pub mod encryption;
pub mod kdf;

pub use self::encryption::{EncryptedPayload, EncryptionKey, VaultEncryptor, VaultEnvelope};
pub use self::kdf::{KdfParams, KeyDerivation};
