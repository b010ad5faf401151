//! Store Errors
//!
//! Both variants are fatal to classify/upsert and must reach the caller
//! as errors, never as a spurious `NewDevice`.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend cannot be reached or failed an I/O operation
    #[error("fingerprint store unavailable: {0}")]
    Unavailable(String),

    /// A stored row cannot be decoded
    #[error("corrupt fingerprint record '{device_id}': {reason}")]
    Corrupt { device_id: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
