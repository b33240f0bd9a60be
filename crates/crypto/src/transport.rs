//! Boundary to the backend that stores public keys and envelopes.
//!
//! The backend only ever sees public keys, ciphertext and plaintext
//! metadata (sender id, timestamp). [`MemoryTransport`] is an in-process
//! implementation for tests and local sessions.

use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use dashmap::DashMap;
use firechat_shared::api::message::EnvelopeRecord;
use firechat_shared::api::user::UserRecord;
use firechat_shared::error::FireChatError;
use firechat_shared::ids::{ConversationId, UserId};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

use crate::envelope::Envelope;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The backend could not be reached.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<TransportError> for FireChatError {
    fn from(err: TransportError) -> Self {
        FireChatError::Transport(err.to_string())
    }
}

/// Stream of full conversation snapshots, oldest record first.
pub type EnvelopeStream = BoxStream<'static, Vec<EnvelopeRecord>>;

#[async_trait::async_trait]
pub trait EnvelopeTransport: Send + Sync {
    /// Publish (or replace) a user's directory entry.
    async fn publish_public_key(&self, record: UserRecord) -> Result<(), TransportError>;

    /// SPKI DER public key of `user`, if they have published one.
    async fn fetch_recipient_public_key(
        &self,
        user: UserId,
    ) -> Result<Option<Vec<u8>>, TransportError>;

    /// Append an envelope to a conversation.
    async fn persist_envelope(
        &self,
        conversation: &ConversationId,
        sender: UserId,
        envelope: &Envelope,
        timestamp: i64,
    ) -> Result<(), TransportError>;

    /// Subscribe to a conversation. The current snapshot is delivered first,
    /// then a new snapshot after every change.
    async fn observe_envelopes(
        &self,
        conversation: &ConversationId,
    ) -> Result<EnvelopeStream, TransportError>;

    /// Remove a user's directory entry.
    async fn remove_user(&self, user: UserId) -> Result<(), TransportError>;
}

#[derive(Default)]
struct ConversationLog {
    records: Vec<EnvelopeRecord>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<EnvelopeRecord>>>,
}

impl ConversationLog {
    fn insert(&mut self, record: EnvelopeRecord) {
        // Stable for equal timestamps: later arrivals stay after earlier ones.
        let index = self
            .records
            .partition_point(|existing| existing.timestamp <= record.timestamp);
        self.records.insert(index, record);
    }

    fn notify(&mut self) {
        let snapshot = self.records.clone();
        self.subscribers
            .retain(|subscriber| subscriber.unbounded_send(snapshot.clone()).is_ok());
    }
}

/// In-process backend.
#[derive(Default)]
pub struct MemoryTransport {
    users: DashMap<UserId, UserRecord>,
    conversations: DashMap<ConversationId, ConversationLog>,
    offline: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory entry for `user`, if published.
    pub fn user(&self, user: UserId) -> Option<UserRecord> {
        self.users.get(&user).map(|entry| entry.clone())
    }

    /// Make every subsequent call fail with [`TransportError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Insert a raw record as another client would have written it.
    pub fn inject_record(&self, conversation: &ConversationId, record: EnvelopeRecord) {
        let mut log = self.conversations.entry(*conversation).or_default();
        log.insert(record);
        log.notify();
    }

    fn ensure_online(&self) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("backend is offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EnvelopeTransport for MemoryTransport {
    async fn publish_public_key(&self, record: UserRecord) -> Result<(), TransportError> {
        self.ensure_online()?;
        tracing::debug!(user_id = %record.user_id, "published public key");
        self.users.insert(record.user_id, record);
        Ok(())
    }

    async fn fetch_recipient_public_key(
        &self,
        user: UserId,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        self.ensure_online()?;
        let Some(record) = self.user(user) else {
            return Ok(None);
        };
        let der = base64::engine::general_purpose::STANDARD
            .decode(&record.public_key_base64)
            .map_err(|e| {
                TransportError::Rejected(format!("stored public key is not base64: {e}"))
            })?;
        Ok(Some(der))
    }

    async fn persist_envelope(
        &self,
        conversation: &ConversationId,
        sender: UserId,
        envelope: &Envelope,
        timestamp: i64,
    ) -> Result<(), TransportError> {
        self.ensure_online()?;
        if !conversation.includes(sender) {
            return Err(TransportError::Rejected(format!(
                "{sender} is not a participant in {conversation}"
            )));
        }
        let record = envelope.clone().into_record(sender, timestamp);
        let mut log = self.conversations.entry(*conversation).or_default();
        log.insert(record);
        log.notify();
        tracing::debug!(%conversation, records = log.records.len(), "persisted envelope");
        Ok(())
    }

    async fn observe_envelopes(
        &self,
        conversation: &ConversationId,
    ) -> Result<EnvelopeStream, TransportError> {
        self.ensure_online()?;
        let (tx, rx) = mpsc::unbounded();
        let mut log = self.conversations.entry(*conversation).or_default();
        tx.unbounded_send(log.records.clone())
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        log.subscribers.push(tx);
        Ok(rx.boxed())
    }

    async fn remove_user(&self, user: UserId) -> Result<(), TransportError> {
        self.ensure_online()?;
        if self.users.remove(&user).is_some() {
            tracing::info!(user_id = %user, "removed user from directory");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(tag: &str) -> Envelope {
        Envelope {
            wrapped_key: format!("key-{tag}"),
            ciphertext: format!("ct-{tag}"),
            nonce: format!("iv-{tag}"),
        }
    }

    fn pair() -> (UserId, UserId, ConversationId) {
        let (a, b) = (UserId::new(), UserId::new());
        (a, b, ConversationId::between(a, b).unwrap())
    }

    #[tokio::test]
    async fn published_key_can_be_fetched_as_der() {
        let transport = MemoryTransport::new();
        let user = UserId::new();
        transport
            .publish_public_key(UserRecord {
                user_id: user,
                user_name: "Alice".into(),
                public_key_base64: "AQID".into(),
            })
            .await
            .unwrap();

        let der = transport.fetch_recipient_public_key(user).await.unwrap();
        assert_eq!(der, Some(vec![1, 2, 3]));
        assert!(transport
            .fetch_recipient_public_key(UserId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn observe_delivers_snapshot_then_updates_in_timestamp_order() {
        let transport = MemoryTransport::new();
        let (a, b, conv) = pair();
        transport
            .persist_envelope(&conv, a, &envelope("first"), 20)
            .await
            .unwrap();

        let mut stream = transport.observe_envelopes(&conv).await.unwrap();
        let initial = stream.next().await.unwrap();
        assert_eq!(initial.len(), 1);

        transport
            .persist_envelope(&conv, b, &envelope("earlier"), 10)
            .await
            .unwrap();
        let update = stream.next().await.unwrap();
        let timestamps: Vec<i64> = update.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![10, 20]);
        assert_eq!(update[0].sender_id, b);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_arrival_order() {
        let transport = MemoryTransport::new();
        let (a, _, conv) = pair();
        for tag in ["one", "two", "three"] {
            transport
                .persist_envelope(&conv, a, &envelope(tag), 5)
                .await
                .unwrap();
        }
        let mut stream = transport.observe_envelopes(&conv).await.unwrap();
        let snapshot = stream.next().await.unwrap();
        let ivs: Vec<&str> = snapshot.iter().map(|r| r.iv.as_str()).collect();
        assert_eq!(ivs, vec!["iv-one", "iv-two", "iv-three"]);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let transport = MemoryTransport::new();
        let (a, _, first) = pair();
        let (_, _, second) = pair();
        transport
            .persist_envelope(&first, a, &envelope("x"), 1)
            .await
            .unwrap();
        let mut stream = transport.observe_envelopes(&second).await.unwrap();
        assert!(stream.next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_participant_sender_is_rejected() {
        let transport = MemoryTransport::new();
        let (_, _, conv) = pair();
        let result = transport
            .persist_envelope(&conv, UserId::new(), &envelope("x"), 1)
            .await;
        assert!(matches!(result, Err(TransportError::Rejected(_))));
    }

    #[tokio::test]
    async fn offline_backend_fails_every_call() {
        let transport = MemoryTransport::new();
        let (a, _, conv) = pair();
        transport.set_offline(true);
        assert!(matches!(
            transport.fetch_recipient_public_key(a).await,
            Err(TransportError::Unavailable(_))
        ));
        assert!(matches!(
            transport.persist_envelope(&conv, a, &envelope("x"), 1).await,
            Err(TransportError::Unavailable(_))
        ));
        transport.set_offline(false);
        assert!(transport.fetch_recipient_public_key(a).await.is_ok());
    }

    #[tokio::test]
    async fn remove_user_deletes_directory_entry() {
        let transport = MemoryTransport::new();
        let user = UserId::new();
        transport
            .publish_public_key(UserRecord {
                user_id: user,
                user_name: "Gone".into(),
                public_key_base64: "AA==".into(),
            })
            .await
            .unwrap();
        transport.remove_user(user).await.unwrap();
        assert!(transport.user(user).is_none());
        transport.remove_user(user).await.unwrap();
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let transport = MemoryTransport::new();
        let (a, _, conv) = pair();
        let stream = transport.observe_envelopes(&conv).await.unwrap();
        drop(stream);
        transport
            .persist_envelope(&conv, a, &envelope("x"), 1)
            .await
            .unwrap();
        assert!(transport.conversations.get(&conv).unwrap().subscribers.is_empty());
    }

    #[test]
    fn transport_error_converts_to_firechat_error() {
        let err: FireChatError = TransportError::Unavailable("down".into()).into();
        assert!(matches!(err, FireChatError::Transport(_)));
    }
}
