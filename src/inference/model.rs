use std::path::PathBuf;

use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider},
    inputs,
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

use crate::inference::errors::{InferenceError, Result};

#[derive(Debug)]
pub struct TextGenerationModelConfig {
    pub model_name: String,
    pub model_path: PathBuf,
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
}

pub struct TextGenerationModel {
    pub name: String,
    session: Session,
}

impl TextGenerationModel {
    pub fn new(cfg: TextGenerationModelConfig) -> Result<Self> {
        let mut builder = Session::builder()?;

        // Register with the cuda provider if it exists
        let cuda = CUDAExecutionProvider::default();
        if cuda.is_available().unwrap_or(false) {
            if let Err(e) = cuda.register(&mut builder) {
                log::error!("Failed to register CUDA provider: {}", e);
            } else {
                log::debug!("CUDA provider registered");
            }
        }

        let session = builder
            .with_optimization_level(cfg.optimization_level)?
            .with_intra_threads(cfg.intra_threads)?
            .commit_from_file(&cfg.model_path)?;

        Ok(Self {
            name: cfg.model_name,
            session,
        })
    }

    /// Runs the model over `tokens` and returns `(token_id, logit)` pairs for
    /// the position after the last token.
    pub fn next_token_logits(&mut self, tokens: &[i64]) -> Result<Vec<(usize, f32)>> {
        // The model expects input of shape [B, _, S] with a batch of one.
        let input = TensorRef::from_array_view((vec![1, 1, tokens.len() as i64], tokens))?;
        let outputs = self.session.run(inputs![input])?;
        let (dim, logits) = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
            InferenceError::OutputExtractionError(format!("error extracting tensor: {}", e))
        })?;

        // Output shape is [.., S, V]; only the last V chunk matters.
        if dim.len() < 2 {
            return Err(InferenceError::OutputExtractionError(format!(
                "unexpected logits shape {:?}",
                dim
            )));
        }
        let seq_len = dim[dim.len() - 2] as usize;
        let vocab_size = dim[dim.len() - 1] as usize;
        if seq_len == 0 || logits.len() < seq_len * vocab_size {
            return Err(InferenceError::OutputExtractionError(format!(
                "logits too short for shape {:?}",
                dim
            )));
        }
        let last = &logits[(seq_len - 1) * vocab_size..seq_len * vocab_size];
        Ok(last.iter().copied().enumerate().collect())
    }
}
