use std::path::{Component, Path, PathBuf};

use hf_hub::api::sync::Api;
use log::{debug, info, trace};
use ort::session::builder::GraphOptimizationLevel;
use rand::Rng;

use crate::{
    inference::{
        errors::{InferenceError, Result},
        model::{TextGenerationModel, TextGenerationModelConfig},
        prompting::{ChatTemplate, JinjaChatTemplate},
        provider::{GenerationParameters, InferenceProvider},
        tokenization::Tokenizer,
    },
    utils::get_env,
};

const MODEL_DIR_VAR: &str = "MODEL_DIR";
const DEFAULT_MODEL_DIR: &str = "./data/models";
const MODEL_FILE: &str = "model.onnx";
const HUB_MODEL_FILE: &str = "onnx/model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const CHAT_TEMPLATE_FILE: &str = "chat_template.jinja";
const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone)]
pub struct OnnxProviderConfig {
    /// Checked for `<model_name>/model.onnx` before falling back to the hub.
    pub model_dir: PathBuf,
    pub intra_threads: usize,
    pub top_k: usize,
}

impl Default for OnnxProviderConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            intra_threads: 4,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl OnnxProviderConfig {
    pub fn from_env() -> Self {
        Self {
            model_dir: PathBuf::from(get_env(MODEL_DIR_VAR, DEFAULT_MODEL_DIR)),
            ..Self::default()
        }
    }
}

struct ModelFiles {
    model: PathBuf,
    tokenizer: PathBuf,
    chat_template: Option<PathBuf>,
}

/// Text generation on ONNX Runtime with Hugging Face tokenizers.
pub struct OnnxProvider {
    cfg: OnnxProviderConfig,
}

impl OnnxProvider {
    pub fn new(cfg: OnnxProviderConfig) -> Self {
        Self { cfg }
    }

    fn resolve_files(&self, model_name: &str) -> Result<ModelFiles> {
        // Only plain relative names may be joined onto the model directory.
        let relative = Path::new(model_name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if model_name.is_empty() || !relative {
            return Err(InferenceError::ModelNotFound(format!(
                "invalid model name '{}'",
                model_name
            )));
        }

        let local = self.cfg.model_dir.join(model_name);
        let model = local.join(MODEL_FILE);
        let tokenizer = local.join(TOKENIZER_FILE);
        if model.is_file() && tokenizer.is_file() {
            debug!("Using local model files in {}", local.display());
            let chat_template = Some(local.join(CHAT_TEMPLATE_FILE)).filter(|p| p.is_file());
            return Ok(ModelFiles {
                model,
                tokenizer,
                chat_template,
            });
        }

        info!("Fetching {} from the Hugging Face hub", model_name);
        let api = Api::new()
            .map_err(|e| InferenceError::ModelLoading(format!("hub unavailable: {}", e)))?;
        let repo = api.model(model_name.to_string());
        let model = repo
            .get(HUB_MODEL_FILE)
            .map_err(|e| InferenceError::ModelNotFound(format!("{}: {}", model_name, e)))?;
        let tokenizer = repo
            .get(TOKENIZER_FILE)
            .map_err(|e| InferenceError::ModelNotFound(format!("{}: {}", model_name, e)))?;
        let chat_template = repo.get(CHAT_TEMPLATE_FILE).ok();
        Ok(ModelFiles {
            model,
            tokenizer,
            chat_template,
        })
    }

    fn load_chat_template(model_name: &str, path: Option<&Path>) -> Option<Box<dyn ChatTemplate>> {
        let path = path?;
        match JinjaChatTemplate::from_file(model_name, path) {
            Ok(t) => Some(Box::new(t)),
            Err(e) => {
                debug!("Falling back to default chat template: {}", e);
                None
            }
        }
    }

    fn generate_text(
        &self,
        model: &mut TextGenerationModel,
        tokenizer: &Tokenizer,
        input: &str,
        params: &GenerationParameters,
    ) -> Result<String> {
        if params.max_tokens < 0 {
            return Err(InferenceError::TextGenerationError(format!(
                "invalid max_tokens {}",
                params.max_tokens
            )));
        }

        let mut input_tokens = tokenizer.tokenize_to_ids(input)?;
        if input_tokens.is_empty() {
            return Err(InferenceError::TextGenerationError(
                "prompt produced no tokens".to_string(),
            ));
        }
        let eos = tokenizer.eos_token_id();
        let mut generated_tokens = Vec::new();
        let mut rng = rand::rng();

        for _ in 0..params.max_tokens {
            let logits = model.next_token_logits(&input_tokens)?;
            let tokens = process_logits(logits, params.temperature as f32);
            if tokens.is_empty() {
                break;
            }
            let top_k_size = self.cfg.top_k.max(1).min(tokens.len());
            let token = tokens[rng.random_range(0..top_k_size)].0 as i64;
            if eos == Some(token) {
                debug!("EOS found on token {}", generated_tokens.len());
                break;
            }
            input_tokens.push(token);
            generated_tokens.push(token as u32);
        }

        let output = tokenizer.decode(&generated_tokens, true)?;
        Ok(output.trim_start().to_string())
    }
}

impl InferenceProvider for OnnxProvider {
    type Model = TextGenerationModel;
    type Tokenizer = Tokenizer;

    fn load(&self, model_name: &str) -> Result<(TextGenerationModel, Tokenizer)> {
        let files = self.resolve_files(model_name)?;
        let model = TextGenerationModel::new(TextGenerationModelConfig {
            model_name: model_name.to_string(),
            model_path: files.model,
            intra_threads: self.cfg.intra_threads,
            optimization_level: GraphOptimizationLevel::Level3,
        })?;
        let chat_template = Self::load_chat_template(model_name, files.chat_template.as_deref());
        let tokenizer = Tokenizer::from_file(&files.tokenizer, chat_template)?;
        Ok((model, tokenizer))
    }

    fn generate(
        &self,
        model: &mut TextGenerationModel,
        tokenizer: &Tokenizer,
        prompt: &str,
        params: &GenerationParameters,
    ) -> Result<String> {
        debug!("Generating from: {:?}", params);
        let response = self.generate_text(model, tokenizer, prompt, params)?;
        if params.verbose {
            info!("Prompt: {}", prompt);
            info!("Response: {}", response);
        }
        Ok(response)
    }

    fn batch_generate(
        &self,
        model: &mut TextGenerationModel,
        tokenizer: &Tokenizer,
        prompts: &[String],
        params: &GenerationParameters,
        format_prompts: bool,
    ) -> Result<Vec<String>> {
        debug!("Generating {} prompts with {:?}", prompts.len(), params);
        prompts
            .iter()
            .enumerate()
            .map(|(i, prompt)| {
                let input = if format_prompts {
                    tokenizer.chat_template.format_prompt(prompt)?
                } else {
                    prompt.clone()
                };
                let response = self.generate_text(model, tokenizer, &input, params)?;
                if params.verbose {
                    info!("[{}] Prompt: {}", i, prompt);
                    info!("[{}] Response: {}", i, response);
                }
                Ok(response)
            })
            .collect()
    }
}

/// Turns raw logits into `(token_id, probability)` pairs sorted by
/// probability, highest first. A non-positive temperature keeps only the most
/// likely token.
fn process_logits(logits: Vec<(usize, f32)>, temperature: f32) -> Vec<(usize, f32)> {
    trace!("Processing {} logits", logits.len());
    if logits.is_empty() {
        return logits;
    }

    if temperature <= 0.0 || !temperature.is_finite() {
        let best = logits
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Less));
        return best.map(|(id, _)| vec![(id, 1.0)]).unwrap_or_default();
    }

    // Subtract the maximum logit to avoid overflow in exp().
    let inv_temp = 1.0 / temperature;
    let max_logit = logits
        .iter()
        .map(|(_, logit)| *logit * inv_temp)
        .fold(f32::NEG_INFINITY, f32::max);

    let exp_vals: Vec<(usize, f32)> = logits
        .iter()
        .map(|(id, logit)| (*id, ((*logit * inv_temp) - max_logit).exp()))
        .collect();

    let sum: f32 = exp_vals.iter().map(|(_, val)| *val).sum();
    let mut probs: Vec<(usize, f32)> = exp_vals
        .into_iter()
        .map(|(id, val)| (id, val / sum))
        .collect();

    probs.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Less));
    probs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_logits_sorts_and_normalizes() {
        let probs = process_logits(vec![(0, 1.0), (1, 3.0), (2, 2.0)], 1.0);
        let ids: Vec<_> = probs.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        let total: f32 = probs.iter().map(|(_, p)| *p).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_process_logits_lower_temperature_is_sharper() {
        let logits = vec![(0, 1.0), (1, 2.0)];
        let warm = process_logits(logits.clone(), 1.0);
        let cold = process_logits(logits, 0.25);
        assert!(cold[0].1 > warm[0].1);
    }

    #[test]
    fn test_process_logits_zero_temperature_is_greedy() {
        let probs = process_logits(vec![(0, 0.5), (7, 4.0), (3, 1.0)], 0.0);
        assert_eq!(probs, vec![(7, 1.0)]);
    }

    #[test]
    fn test_process_logits_empty() {
        assert!(process_logits(vec![], 0.7).is_empty());
    }

    #[test]
    fn test_resolve_files_rejects_parent_traversal() {
        let provider = OnnxProvider::new(OnnxProviderConfig::default());
        assert!(matches!(
            provider.resolve_files("../etc"),
            Err(InferenceError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_files_rejects_absolute_names() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join(MODEL_FILE), b"onnx").unwrap();
        std::fs::write(outside.path().join(TOKENIZER_FILE), b"{}").unwrap();
        let model_dir = tempfile::tempdir().unwrap();

        let provider = OnnxProvider::new(OnnxProviderConfig {
            model_dir: model_dir.path().to_path_buf(),
            ..OnnxProviderConfig::default()
        });
        let name = outside.path().to_string_lossy().to_string();
        assert!(matches!(
            provider.resolve_files(&name),
            Err(InferenceError::ModelNotFound(_))
        ));
        assert!(matches!(
            provider.resolve_files("org/../../etc"),
            Err(InferenceError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_files_prefers_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("org").join("tiny");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join(MODEL_FILE), b"onnx").unwrap();
        std::fs::write(local.join(TOKENIZER_FILE), b"{}").unwrap();

        let provider = OnnxProvider::new(OnnxProviderConfig {
            model_dir: dir.path().to_path_buf(),
            ..OnnxProviderConfig::default()
        });
        let files = provider.resolve_files("org/tiny").unwrap();
        assert_eq!(files.model, local.join(MODEL_FILE));
        assert_eq!(files.tokenizer, local.join(TOKENIZER_FILE));
        assert!(files.chat_template.is_none());
    }
}
