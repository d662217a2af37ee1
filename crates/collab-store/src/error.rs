use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The handle was shut down; no database is attached.
    #[error("store is not open")]
    NotInitialized,

    #[error("storage unavailable: {0:#}")]
    StorageUnavailable(#[from] anyhow::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub fn message_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "message",
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
