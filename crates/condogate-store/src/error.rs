use condogate_core::{Category, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection lock poisoned")]
    Poisoned,
    #[error("category '{0}' has no identity table")]
    NoIdentityTable(Category),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        StorageError::new(err)
    }
}
