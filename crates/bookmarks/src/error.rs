use crate::profile::ProfileError;

#[derive(Debug, thiserror::Error)]
pub enum BookmarksError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BookmarksError>;
