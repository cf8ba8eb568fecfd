use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("encryption key must be 64 hex characters (32 bytes)")]
    InvalidKey,
    #[error("encryption failed: {0}")]
    EncryptFailed(String),
    #[error("decryption failed: {0}")]
    DecryptFailed(String),
}

/// AES-256-GCM encryption for channel payloads at rest. The 96-bit nonce is
/// generated per encryption and prepended to the ciphertext.
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    /// The key is supplied by configuration as a 64-character hex string.
    pub fn from_hex_key(key_hex: &str) -> Result<Self, EncryptionError> {
        let key = hex::decode(key_hex).map_err(|_| EncryptionError::InvalidKey)?;
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|_| EncryptionError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| EncryptionError::EncryptFailed(e.to_string()))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if sealed.len() < NONCE_LEN {
            return Err(EncryptionError::DecryptFailed(
                "data too short to contain a nonce".to_string(),
            ));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| EncryptionError::DecryptFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let service = EncryptionService::from_hex_key(KEY).unwrap();
        let plaintext = br#"{"type":"telegram","botToken":"123:abc","chatId":"42"}"#;

        let sealed = service.encrypt(plaintext).unwrap();
        assert_ne!(&sealed[NONCE_LEN..], plaintext.as_slice());
        assert_eq!(service.decrypt(&sealed).unwrap(), plaintext);
    }

    #[test]
    fn decrypting_with_the_wrong_key_fails() {
        let service = EncryptionService::from_hex_key(KEY).unwrap();
        let other = EncryptionService::from_hex_key(
            "f1e1d1c1b1a191817161514131211101f0e0d0c0b0a0908070605040302010ff",
        )
        .unwrap();

        let sealed = service.encrypt(b"secret").unwrap();
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn rejects_short_keys_and_short_ciphertexts() {
        assert!(EncryptionService::from_hex_key("abcd").is_err());
        let service = EncryptionService::from_hex_key(KEY).unwrap();
        assert!(service.decrypt(&[0u8; 4]).is_err());
    }
}
