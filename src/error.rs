use thiserror::Error;

/// Failure taxonomy returned by every engine operation. The enclosing
/// transport layer maps each variant to a status code.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("invitation not found")]
    InvitationNotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("already exists")]
    AlreadyExists,
    #[error("friendship missing")]
    FriendshipMissing,
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// Storage faults are propagated unchanged from the store.
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;
