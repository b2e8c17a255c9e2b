//! Game server directories queried during allocation

use crate::extensions::SelectionFilter;
use crate::types::GameServer;
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a game server directory
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("no game servers found for filter {filter}")]
    NotFound { filter: String },

    #[error("there is no available GameServer to allocate")]
    NoAvailableGameServer,

    #[error("directory request failed: {message}")]
    Transport { message: String },

    #[error("directory returned an invalid response: {message}")]
    InvalidResponse { message: String },
}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DirectoryError::InvalidResponse {
                message: e.to_string(),
            }
        } else {
            DirectoryError::Transport {
                message: e.to_string(),
            }
        }
    }
}

/// Source of game server candidates for a selection filter
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameServerDirectory: Send + Sync {
    /// Candidates matching the filter, in the directory's own order
    async fn list_game_servers(
        &self,
        filter: &SelectionFilter,
    ) -> std::result::Result<Vec<GameServer>, DirectoryError>;

    /// Short name for logs and metrics
    fn name(&self) -> &'static str;
}
