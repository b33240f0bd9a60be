//! Records exchanged with the remote user directory and message store.

pub mod message;
pub mod user;
