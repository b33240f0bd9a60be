/// Shared error type surfaced to the application layer.
#[derive(Debug, thiserror::Error)]
pub enum FireChatError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}
