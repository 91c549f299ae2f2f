use thiserror::Error;

#[derive(Debug, Error)]
pub enum TanyaError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TanyaError {
    /// Shorthand for a missing session.
    pub fn session_not_found(id: &str) -> Self {
        Self::NotFound(format!("session {id}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns `true` for failures of the backing store itself (file system,
    /// database, encoding) as opposed to domain errors the caller caused.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Io(_) | Self::Serialization(_)
        )
    }
}

impl From<rusqlite::Error> for TanyaError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TanyaError>;
