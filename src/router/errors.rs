use thiserror::Error as ThisError;

use crate::repository::errors::RepositoryError;
use crate::services::errors::ServiceError;

// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

// Errors raised while wiring the router at startup
#[derive(ThisError, Debug)]
pub enum ApiError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}
