//! Error types for coordinators and the hub

use crate::lifecycle::InvalidTransition;
use iaw_client::ClientError;
use iaw_storage::StorageError;
use iaw_telegram::RelayError;
use thiserror::Error;

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors from hub setup and album management
///
/// Poll failures never surface here; they are recorded on the coordinator
/// as `last_update_success` and `last_error`.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Lifecycle(#[from] InvalidTransition),

    #[error("album {album_id} is already watched")]
    AlbumExists { album_id: String },

    #[error("album {album_id} is not watched")]
    AlbumNotFound { album_id: String },
}
