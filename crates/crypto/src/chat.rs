//! Two-party chat flow over an [`EnvelopeTransport`].
//!
//! Outgoing bodies are wrapped for the recipient only, so the sender cannot
//! decrypt its own envelopes. `ChatClient` keeps the plaintext of messages
//! it sent in this session, keyed by nonce, and renders them from there.
//!
//! Every other record is opened at most once per session: outcomes are
//! cached by a digest of the envelope fields, and snapshots are rendered on
//! the blocking pool so RSA work never runs on the async executor.

use std::sync::Arc;

use dashmap::DashMap;
use firechat_shared::api::message::EnvelopeRecord;
use firechat_shared::api::user::UserRecord;
use firechat_shared::constants::{ANONYMOUS_USER_NAME, MAX_DISPLAY_NAME_LENGTH};
use firechat_shared::error::FireChatError;
use firechat_shared::ids::{ConversationId, UserId};
use futures::stream::BoxStream;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::envelope::{decrypt_message, encrypt_message, Envelope};
use crate::error::CryptoError;
use crate::fingerprint::{generate_fingerprint, Fingerprint};
use crate::keystore::{KeyPairStatus, KeyStore};
use crate::transport::{EnvelopeTransport, TransportError};
use crate::wrap::PublicKey;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("validation error: {0}")]
    Validation(String),

    /// A blocking crypto task panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl From<ChatError> for FireChatError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Crypto(e) => e.into(),
            ChatError::Transport(e) => e.into(),
            ChatError::Validation(msg) => FireChatError::Validation(msg),
            ChatError::Worker(msg) => FireChatError::Internal(msg),
        }
    }
}

/// Rendered content of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// The record could not be opened; carries the reason. Other records in
    /// the same conversation are unaffected.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub timestamp: i64,
    /// Whether the local user sent this message.
    pub outgoing: bool,
    pub body: MessageBody,
}

/// One signed-in user's view of the chat backend.
#[derive(Clone)]
pub struct ChatClient {
    user_id: UserId,
    keys: Arc<dyn KeyStore>,
    transport: Arc<dyn EnvelopeTransport>,
    /// Plaintext of messages sent in this session, keyed by base64 nonce.
    sent: Arc<DashMap<String, String>>,
    /// Settled outcome of every record opened so far, keyed by [`record_digest`].
    opened: Arc<DashMap<[u8; 32], MessageBody>>,
}

impl ChatClient {
    pub fn new(
        user_id: UserId,
        keys: Arc<dyn KeyStore>,
        transport: Arc<dyn EnvelopeTransport>,
    ) -> Self {
        Self {
            user_id,
            keys,
            transport,
            sent: Arc::new(DashMap::new()),
            opened: Arc::new(DashMap::new()),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Ensure the local key pair exists and publish its public half.
    ///
    /// Runs on sign-up and anonymous account creation. A blank name becomes
    /// the anonymous display name.
    pub async fn provision(&self, user_name: &str) -> Result<KeyPairStatus, ChatError> {
        let user_name = normalize_display_name(user_name)?;

        let keys = Arc::clone(&self.keys);
        let status = tokio::task::spawn_blocking(move || keys.generate_key_pair())
            .await
            .map_err(|e| ChatError::Worker(e.to_string()))??;

        let public_key_base64 = self.keys.require_public_key()?.to_base64()?;
        self.transport
            .publish_public_key(UserRecord {
                user_id: self.user_id,
                user_name,
                public_key_base64,
            })
            .await?;

        tracing::info!(user_id = %self.user_id, ?status, "provisioned identity");
        Ok(status)
    }

    /// Encrypt `text` for `recipient` and append it to their conversation.
    pub async fn send_message(&self, recipient: UserId, text: &str) -> Result<(), ChatError> {
        let conversation = self.conversation_with(recipient)?;
        let recipient_key = self.fetch_public_key(recipient).await?;

        let plaintext = text.to_owned();
        let envelope =
            tokio::task::spawn_blocking(move || encrypt_message(&plaintext, &recipient_key))
                .await
                .map_err(|e| ChatError::Worker(e.to_string()))??;

        // Cached first so a snapshot delivered during persist can render it.
        let nonce = envelope.nonce.clone();
        self.sent.insert(nonce.clone(), text.to_owned());

        let timestamp = chrono::Utc::now().timestamp();
        if let Err(e) = self
            .transport
            .persist_envelope(&conversation, self.user_id, &envelope, timestamp)
            .await
        {
            self.sent.remove(&nonce);
            return Err(e.into());
        }

        tracing::debug!(%conversation, timestamp, "sent message");
        Ok(())
    }

    /// Render one record. Never fails: a record that cannot be opened is
    /// reported as [`MessageBody::Unavailable`].
    ///
    /// May perform an RSA private-key operation; async callers should prefer
    /// [`ChatClient::conversation`], which renders on the blocking pool.
    pub fn open_record(&self, record: &EnvelopeRecord) -> ChatMessage {
        let outgoing = record.sender_id == self.user_id;
        let body = match outgoing.then(|| self.sent.get(&record.iv)).flatten() {
            Some(text) => MessageBody::Text(text.clone()),
            None => self.open_uncached(record, outgoing),
        };

        ChatMessage {
            sender_id: record.sender_id,
            timestamp: record.timestamp,
            outgoing,
            body,
        }
    }

    /// Render a whole snapshot on the blocking pool.
    async fn open_snapshot(&self, snapshot: Vec<EnvelopeRecord>) -> Vec<ChatMessage> {
        let headers: Vec<(UserId, i64)> = snapshot
            .iter()
            .map(|record| (record.sender_id, record.timestamp))
            .collect();
        let client = self.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            snapshot
                .iter()
                .map(|record| client.open_record(record))
                .collect::<Vec<_>>()
        })
        .await;

        match rendered {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "snapshot worker failed");
                headers
                    .into_iter()
                    .map(|(sender_id, timestamp)| ChatMessage {
                        sender_id,
                        timestamp,
                        outgoing: sender_id == self.user_id,
                        body: MessageBody::Unavailable(format!("worker failed: {e}")),
                    })
                    .collect()
            }
        }
    }

    /// Live view of the conversation with `other`, oldest message first.
    pub async fn conversation(
        &self,
        other: UserId,
    ) -> Result<BoxStream<'static, Vec<ChatMessage>>, ChatError> {
        let conversation = self.conversation_with(other)?;
        let records = self.transport.observe_envelopes(&conversation).await?;
        let client = self.clone();
        Ok(records
            .then(move |snapshot| {
                let client = client.clone();
                async move { client.open_snapshot(snapshot).await }
            })
            .boxed())
    }

    /// Safety number for verifying `other`'s published key out of band.
    pub async fn safety_number(&self, other: UserId) -> Result<Fingerprint, ChatError> {
        let own = self.keys.require_public_key()?;
        let theirs = self.fetch_public_key(other).await?;
        Ok(generate_fingerprint(&own, self.user_id, &theirs, other)?)
    }

    /// Remove the directory entry, then irreversibly delete the key pair.
    pub async fn delete_account(&self) -> Result<(), ChatError> {
        self.transport.remove_user(self.user_id).await?;
        self.keys.delete_key_pair()?;
        self.sent.clear();
        self.opened.clear();
        tracing::info!(user_id = %self.user_id, "deleted account keys");
        Ok(())
    }

    fn conversation_with(&self, other: UserId) -> Result<ConversationId, ChatError> {
        ConversationId::between(self.user_id, other)
            .map_err(|e| ChatError::Validation(e.to_string()))
    }

    async fn fetch_public_key(&self, user: UserId) -> Result<PublicKey, ChatError> {
        let der = self
            .transport
            .fetch_recipient_public_key(user)
            .await?
            .ok_or_else(|| {
                CryptoError::KeyUnavailable(format!("{user} has not published a public key"))
            })?;
        Ok(PublicKey::from_spki_der(&der)?)
    }

    fn decrypt_record(&self, record: &EnvelopeRecord) -> Result<String, CryptoError> {
        let handle = self.keys.require_private_key()?;
        decrypt_message(&Envelope::from(record), &handle)
    }

    /// Decrypt a record not served from the sent cache, at most once.
    ///
    /// `sender_id` is unauthenticated, so records claiming to be ours are
    /// decrypted like any other before being reported as unreadable.
    fn open_uncached(&self, record: &EnvelopeRecord, outgoing: bool) -> MessageBody {
        let digest = record_digest(record);
        if let Some(body) = self.opened.get(&digest) {
            return body.clone();
        }

        let body = match self.decrypt_record(record) {
            Ok(text) => MessageBody::Text(text),
            // Missing keys are not a property of the record; retry next time.
            Err(e @ CryptoError::KeyUnavailable(_)) => {
                tracing::warn!(sender_id = %record.sender_id, error = %e, "could not open message");
                return MessageBody::Unavailable(e.to_string());
            }
            Err(_) if outgoing => MessageBody::Unavailable("sent from another session".into()),
            Err(e) => {
                tracing::warn!(
                    sender_id = %record.sender_id,
                    timestamp = record.timestamp,
                    error = %e,
                    "could not open message"
                );
                MessageBody::Unavailable(e.to_string())
            }
        };
        self.opened.insert(digest, body.clone());
        body
    }
}

/// Identifies a record by its encrypted content. Each field is length
/// prefixed so distinct field splits cannot collide.
fn record_digest(record: &EnvelopeRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for field in [&record.iv, &record.encrypted_aes_key, &record.encrypted_message] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.finalize().into()
}

fn normalize_display_name(user_name: &str) -> Result<String, ChatError> {
    let trimmed = user_name.trim();
    if trimmed.is_empty() {
        return Ok(ANONYMOUS_USER_NAME.to_string());
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(ChatError::Validation(format!(
            "display name longer than {MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}
