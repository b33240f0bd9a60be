/// Separator between the two sorted participant ids of a conversation id.
pub const CONVERSATION_ID_SEPARATOR: char = ',';
/// Display name given to accounts created without a profile.
pub const ANONYMOUS_USER_NAME: &str = "Anonymous User";
/// Maximum length for user display names.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 64;
/// Maximum size for a single message body in bytes, before encryption.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 256 * 1024;
