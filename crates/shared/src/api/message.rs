use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// One encrypted message as persisted by the message store.
///
/// Only the body is protected. `sender_id` and `timestamp` travel in the
/// clear so the store can order and attribute records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeRecord {
    pub sender_id: UserId,
    /// Base64 AES-GCM ciphertext with the authentication tag appended.
    pub encrypted_message: String,
    /// Base64 symmetric key wrapped for the recipient.
    pub encrypted_aes_key: String,
    /// Base64 96-bit nonce.
    pub iv: String,
    /// Unix seconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_record_uses_wire_field_names() {
        let record = EnvelopeRecord {
            sender_id: UserId::new(),
            encrypted_message: "Y2lwaGVy".into(),
            encrypted_aes_key: "a2V5".into(),
            iv: "bm9uY2U=".into(),
            timestamp: 1_700_000_000,
        };
        let json = serde_json::to_value(&record).unwrap();
        for field in ["senderId", "encryptedMessage", "encryptedAesKey", "iv", "timestamp"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["timestamp"], 1_700_000_000);
    }

    #[test]
    fn envelope_record_deserializes_from_store_json() {
        let sender = UserId::new();
        let json = format!(
            r#"{{"senderId":"{sender}","encryptedMessage":"AA==","encryptedAesKey":"AQ==","iv":"Ag==","timestamp":42}}"#
        );
        let record: EnvelopeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.sender_id, sender);
        assert_eq!(record.timestamp, 42);
        assert_eq!(record.iv, "Ag==");
    }
}
