pub mod errors;
pub mod llm;
pub mod prompting;
pub mod provider;

mod model;
mod tokenization;

pub use model::{TextGenerationModel, TextGenerationModelConfig};
pub use provider::{GenerationParameters, InferenceProvider};
pub use tokenization::Tokenizer;
