use thiserror::Error as ThisError;

use crate::inference::errors::InferenceError;
use crate::repository::errors::RepositoryError;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(ThisError, Debug)]
pub enum ServiceError {
    // The session cache keeps its previous session when this happens.
    #[error("Model load error for '{model_name}': {source}")]
    ModelLoad {
        model_name: String,
        #[source]
        source: InferenceError,
    },

    // Nothing is persisted for a failed generation.
    #[error("Generation error: {0}")]
    Generation(#[source] InferenceError),

    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),

    // Rejected before any model call or write.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ServiceError {
    /// Stable name of the error class, used in structured tool responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::ModelLoad { .. } => "model_load_error",
            ServiceError::Generation(_) => "generation_error",
            ServiceError::Storage(_) => "storage_error",
            ServiceError::Validation(_) => "validation_error",
        }
    }
}
