//! Authenticated message encryption using AES-256-GCM.
//!
//! Each call to [`encrypt`] draws its own 96-bit nonce; callers never supply
//! one. The 128-bit tag is appended to the ciphertext and checked by
//! [`decrypt`] before any plaintext is released.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

use crate::error::{CryptoError, EnvelopeField};
use crate::symmetric::{fill_random, SymmetricKey};

pub const NONCE_SIZE: usize = 12; // 96-bit nonce for AES-256-GCM
pub const TAG_SIZE: usize = 16; // 128-bit authentication tag

/// Output of one encryption: `ciphertext || tag` and the nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<Sealed, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    fill_random(&mut nonce)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(Sealed { ciphertext, nonce })
}

/// Verify and decrypt `ciphertext` (tag appended) under `key` and `nonce`.
pub fn decrypt(ciphertext: &[u8], key: &SymmetricKey, nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::decoding(
            EnvelopeField::Nonce,
            format!("expected {NONCE_SIZE} bytes, got {}", nonce.len()),
        ));
    }
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::AuthenticationFailure);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::generate_key;

    fn key() -> SymmetricKey {
        generate_key(256).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = key();
        let sealed = encrypt(b"the quick brown fox", &key).unwrap();
        let plain = decrypt(&sealed.ciphertext, &key, &sealed.nonce).unwrap();
        assert_eq!(plain, b"the quick brown fox");
    }

    #[test]
    fn ciphertext_carries_tag() {
        let data = b"hello world";
        let sealed = encrypt(data, &key()).unwrap();
        assert_eq!(sealed.ciphertext.len(), data.len() + TAG_SIZE);
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = key();
        let sealed = encrypt(b"", &key).unwrap();
        assert_eq!(sealed.ciphertext.len(), TAG_SIZE);
        assert!(decrypt(&sealed.ciphertext, &key, &sealed.nonce)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn same_key_same_plaintext_uses_fresh_nonce() {
        let key = key();
        let a = encrypt(b"repeat", &key).unwrap();
        let b = encrypt(b"repeat", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn flipped_ciphertext_byte_fails_authentication() {
        let key = key();
        let sealed = encrypt(b"integrity matters", &key).unwrap();
        for i in 0..sealed.ciphertext.len() {
            let mut tampered = sealed.ciphertext.clone();
            tampered[i] ^= 0x01;
            assert!(matches!(
                decrypt(&tampered, &key, &sealed.nonce),
                Err(CryptoError::AuthenticationFailure)
            ));
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = encrypt(b"secret", &key()).unwrap();
        assert!(matches!(
            decrypt(&sealed.ciphertext, &key(), &sealed.nonce),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn wrong_nonce_fails_authentication() {
        let key = key();
        let sealed = encrypt(b"secret", &key).unwrap();
        let mut nonce = sealed.nonce;
        nonce[0] ^= 0xFF;
        assert!(matches!(
            decrypt(&sealed.ciphertext, &key, &nonce),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn nonce_of_wrong_length_is_decoding_error() {
        let key = key();
        let sealed = encrypt(b"secret", &key).unwrap();
        let result = decrypt(&sealed.ciphertext, &key, &sealed.nonce[..8]);
        assert!(matches!(
            result,
            Err(CryptoError::Decoding {
                field: EnvelopeField::Nonce,
                ..
            })
        ));
    }

    #[test]
    fn truncated_ciphertext_fails_authentication() {
        let key = key();
        let sealed = encrypt(b"secret", &key).unwrap();
        assert!(matches!(
            decrypt(&sealed.ciphertext[..5], &key, &sealed.nonce),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn large_message_roundtrip() {
        let key = key();
        let data = vec![0x42u8; 100 * 1024];
        let sealed = encrypt(&data, &key).unwrap();
        assert_eq!(decrypt(&sealed.ciphertext, &key, &sealed.nonce).unwrap(), data);
    }
}
