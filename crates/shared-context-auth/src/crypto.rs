//! AEAD-at-rest encryption of issued JWTs.
//! The signed JWT is never persisted in plaintext; only `(nonce, ciphertext)`
//! reaches the storage layer.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key};
use shared_context_protocol::{CoreError, CoreResult};

pub struct AeadKey(Aes256Gcm);

impl AeadKey {
    /// Load the process-wide AEAD key from its raw 32-byte form. Absence or
    /// a wrong-sized key at startup is fatal.
    pub fn from_bytes(raw: &[u8]) -> CoreResult<Self> {
        if raw.len() != 32 {
            return Err(CoreError::internal("AEAD key must be exactly 32 bytes"));
        }
        let key = Key::<Aes256Gcm>::from_slice(raw);
        Ok(Self(Aes256Gcm::new(key)))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> CoreResult<(Vec<u8>, Vec<u8>)> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .0
            .encrypt(&nonce, plaintext)
            .map_err(|_| CoreError::internal("failed to encrypt token"))?;
        Ok((ciphertext, nonce.to_vec()))
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> CoreResult<Vec<u8>> {
        if nonce.len() != 12 {
            return Err(CoreError::internal("corrupt nonce in storage"));
        }
        self.0
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| CoreError::internal("failed to decrypt token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let key = AeadKey::from_bytes(&[7u8; 32]).unwrap();
        let (ciphertext, nonce) = key.encrypt(b"hello jwt").unwrap();
        let plaintext = key.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(plaintext, b"hello jwt");
    }

    #[test]
    fn rejects_wrong_key_length() {
        assert!(AeadKey::from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = AeadKey::from_bytes(&[7u8; 32]).unwrap();
        let (mut ciphertext, nonce) = key.encrypt(b"hello jwt").unwrap();
        ciphertext[0] ^= 0xff;
        assert!(key.decrypt(&ciphertext, &nonce).is_err());
    }
}
