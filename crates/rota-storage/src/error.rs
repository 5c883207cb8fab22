use rota_core::UserId;
use thiserror::Error;

/// Rejections raised by the user-management surface. Callers get them wrapped
/// in `anyhow::Error` and can `downcast_ref` when they need to react.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("a user named {0:?} already exists")]
    DuplicateUserName(String),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("user name must not be empty")]
    EmptyUserName,
}
