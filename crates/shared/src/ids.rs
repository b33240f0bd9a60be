use std::fmt;

use crate::constants::CONVERSATION_ID_SEPARATOR;

/// Typed wrapper around UUID v7 identifying a chat user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct UserId(pub uuid::Uuid);

#[allow(clippy::new_without_default)]
impl UserId {
    /// Generate a new time-sortable UUID v7 identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

/// Identifies the one-to-one conversation between two users.
///
/// The pair is stored sorted, so both participants derive the same id
/// regardless of who opens the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId {
    low: UserId,
    high: UserId,
}

/// Errors from building or parsing a [`ConversationId`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationIdError {
    #[error("a conversation needs two distinct participants")]
    SameParticipant,

    #[error("malformed conversation id: {0}")]
    Malformed(String),
}

impl ConversationId {
    /// Build the conversation id for two participants, in either order.
    pub fn between(a: UserId, b: UserId) -> Result<Self, ConversationIdError> {
        if a == b {
            return Err(ConversationIdError::SameParticipant);
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    /// Both participants, lowest id first.
    pub fn participants(&self) -> (UserId, UserId) {
        (self.low, self.high)
    }

    /// Whether `user` takes part in this conversation.
    pub fn includes(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// The participant that is not `user`, if `user` takes part at all.
    pub fn other_participant(&self, user: UserId) -> Option<UserId> {
        if user == self.low {
            Some(self.high)
        } else if user == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{CONVERSATION_ID_SEPARATOR}{}", self.low, self.high)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = ConversationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(CONVERSATION_ID_SEPARATOR)
            .ok_or_else(|| ConversationIdError::Malformed(s.to_string()))?;
        let a = UserId::from_str(a).map_err(|e| ConversationIdError::Malformed(e.to_string()))?;
        let b = UserId::from_str(b).map_err(|e| ConversationIdError::Malformed(e.to_string()))?;
        Self::between(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn user_id_new_creates_valid_uuid() {
        let id = UserId::new();
        assert_eq!(id.0.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn user_id_serializes_to_uuid_string() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"'));
        assert!(json.ends_with('"'));
        let inner = &json[1..json.len() - 1];
        uuid::Uuid::parse_str(inner).unwrap();
    }

    #[test]
    fn user_id_from_str_invalid() {
        assert!(UserId::from_str("not-a-uuid").is_err());
    }

    #[test]
    fn user_id_new_produces_unique_ids() {
        assert_ne!(UserId::new(), UserId::new());
    }

    #[test]
    fn conversation_id_is_order_independent() {
        let alice = UserId::new();
        let bob = UserId::new();
        let ab = ConversationId::between(alice, bob).unwrap();
        let ba = ConversationId::between(bob, alice).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.to_string(), ba.to_string());
    }

    #[test]
    fn conversation_id_rejects_single_participant() {
        let alice = UserId::new();
        assert_eq!(
            ConversationId::between(alice, alice),
            Err(ConversationIdError::SameParticipant)
        );
    }

    #[test]
    fn conversation_id_display_is_sorted_pair() {
        let alice = UserId::new();
        let bob = UserId::new();
        let id = ConversationId::between(bob, alice).unwrap();
        let (low, high) = id.participants();
        assert!(low < high);
        assert_eq!(id.to_string(), format!("{low},{high}"));
    }

    #[test]
    fn conversation_id_parses_its_display_form() {
        let id = ConversationId::between(UserId::new(), UserId::new()).unwrap();
        let parsed = ConversationId::from_str(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn conversation_id_parse_rejects_garbage() {
        assert!(matches!(
            ConversationId::from_str("no-separator-here"),
            Err(ConversationIdError::Malformed(_))
        ));
        assert!(matches!(
            ConversationId::from_str("abc,def"),
            Err(ConversationIdError::Malformed(_))
        ));
    }

    #[test]
    fn other_participant_resolves_peer() {
        let alice = UserId::new();
        let bob = UserId::new();
        let id = ConversationId::between(alice, bob).unwrap();
        assert_eq!(id.other_participant(alice), Some(bob));
        assert_eq!(id.other_participant(bob), Some(alice));
        assert_eq!(id.other_participant(UserId::new()), None);
        assert!(id.includes(alice));
    }
}
