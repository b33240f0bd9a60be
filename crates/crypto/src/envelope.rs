//! Hybrid envelope codec: the public contract used by the chat flow.
//!
//! `encrypt_message` seals one message body for one recipient:
//! fresh AES-256 key → AES-GCM with a fresh nonce → key wrapped with the
//! recipient's RSA-OAEP public key → all three byte strings as base64 text.
//! `decrypt_message` reverses each step. Either side aborts on the first
//! failing step; a partial envelope is never produced or accepted.

use base64::Engine;
use firechat_shared::api::message::EnvelopeRecord;
use firechat_shared::constants::MAX_MESSAGE_SIZE_BYTES;
use firechat_shared::ids::UserId;
use serde::{Deserialize, Serialize};

use crate::cipher;
use crate::error::{CryptoError, EnvelopeField};
use crate::symmetric::{self, SYMMETRIC_KEY_BITS};
use crate::wrap::{self, PrivateKeyHandle, PublicKey};

/// One encrypted message body in transport-safe form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 RSA-OAEP ciphertext of the message key.
    pub wrapped_key: String,
    /// Base64 AES-GCM ciphertext with the tag appended.
    pub ciphertext: String,
    /// Base64 96-bit nonce.
    pub nonce: String,
}

impl Envelope {
    /// Attach plaintext metadata to produce the stored record.
    pub fn into_record(self, sender_id: UserId, timestamp: i64) -> EnvelopeRecord {
        EnvelopeRecord {
            sender_id,
            encrypted_message: self.ciphertext,
            encrypted_aes_key: self.wrapped_key,
            iv: self.nonce,
            timestamp,
        }
    }
}

impl From<&EnvelopeRecord> for Envelope {
    fn from(record: &EnvelopeRecord) -> Self {
        Self {
            wrapped_key: record.encrypted_aes_key.clone(),
            ciphertext: record.encrypted_message.clone(),
            nonce: record.iv.clone(),
        }
    }
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s private key
/// can read it.
pub fn encrypt_message(plaintext: &str, recipient: &PublicKey) -> Result<Envelope, CryptoError> {
    if plaintext.len() > MAX_MESSAGE_SIZE_BYTES {
        return Err(CryptoError::Encryption(format!(
            "message of {} bytes exceeds the {MAX_MESSAGE_SIZE_BYTES}-byte limit",
            plaintext.len()
        )));
    }

    let key = symmetric::generate_key(SYMMETRIC_KEY_BITS)?;
    let sealed = cipher::encrypt(plaintext.as_bytes(), &key)?;
    let wrapped_key = wrap::wrap(key.as_bytes(), recipient)?;

    tracing::debug!(
        plaintext_len = plaintext.len(),
        ciphertext_len = sealed.ciphertext.len(),
        "sealed message envelope"
    );

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(Envelope {
        wrapped_key: b64.encode(wrapped_key),
        ciphertext: b64.encode(&sealed.ciphertext),
        nonce: b64.encode(sealed.nonce),
    })
}

/// Decrypt an envelope addressed to the holder of `own_key`.
pub fn decrypt_message(envelope: &Envelope, own_key: &PrivateKeyHandle) -> Result<String, CryptoError> {
    let wrapped_key = decode_field(&envelope.wrapped_key, EnvelopeField::WrappedKey)?;
    let ciphertext = decode_field(&envelope.ciphertext, EnvelopeField::Ciphertext)?;
    let nonce = decode_field(&envelope.nonce, EnvelopeField::Nonce)?;

    let key = wrap::unwrap(&wrapped_key, own_key)?;
    let plaintext = cipher::decrypt(&ciphertext, &key, &nonce)?;

    String::from_utf8(plaintext).map_err(|e| CryptoError::decoding(EnvelopeField::Body, e))
}

fn decode_field(value: &str, field: EnvelopeField) -> Result<Vec<u8>, CryptoError> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| CryptoError::decoding(field, e))
}
