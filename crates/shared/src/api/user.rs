use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Directory entry published for a user so peers can encrypt to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: UserId,
    pub user_name: String,
    /// Base64 X.509 SubjectPublicKeyInfo DER of the user's public key.
    pub public_key_base64: String,
}
