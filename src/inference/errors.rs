use thiserror::Error as ThisError;

// Result type alias
pub type Result<T> = std::result::Result<T, InferenceError>;

// Main error type for the inference lib.
#[derive(ThisError, Debug)]
pub enum InferenceError {
    // ONNX Runtime errors
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::Error),

    // Error while reading model outputs
    #[error("Output extraction error: {0}")]
    OutputExtractionError(String),

    // Error while generating text
    #[error("Text generation error: {0}")]
    TextGenerationError(String),

    // Tokenization errors
    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Chat template error: {0}")]
    ChatTemplateError(String),

    // The model could not be found locally or on the hub
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    // Model loading errors
    #[error("Model loading error: {0}")]
    ModelLoading(String),
}
