use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("SQL execution error: {0}")]
    SqlExecutionError(#[from] sqlx::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Record decoding error: {0}")]
    DecodingError(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
