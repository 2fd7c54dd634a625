//! AES-256-GCM for personal data written to the ledger.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::LedgerError;

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct DataCipher {
    cipher: Aes256Gcm,
}

impl DataCipher {
    /// The 256-bit key is the SHA-256 digest of the configured passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let key = Sha256::digest(passphrase.as_bytes());
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Hex of `nonce || ciphertext+tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, LedgerError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| LedgerError::Encryption("encryption failed".into()))?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, LedgerError> {
        let raw = hex::decode(encoded).map_err(|e| LedgerError::Encryption(format!("invalid hex: {}", e)))?;
        if raw.len() < NONCE_LEN + 16 {
            return Err(LedgerError::Encryption("ciphertext too short".into()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| LedgerError::Encryption("decryption failed".into()))
    }
}

/// SHA-256 hex digest, used as the metadata hash of ledger records.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
