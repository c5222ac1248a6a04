use std::{num::NonZeroU32, sync::Arc};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    inference::{GenerationParameters, InferenceProvider, errors::InferenceError},
    repository::{
        GenerationRepository,
        models::{GenerationRecord, NewGenerationRecord},
    },
    services::{
        batch::new_batch_id,
        errors::{Result, ServiceError},
        session::{ModelSessionCache, SessionStatus},
    },
};

pub const DEFAULT_MAX_TOKENS: i64 = 300;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_READ_LIMIT: i64 = 10;

fn default_max_tokens() -> i64 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SingleGenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub verbose: bool,
    /// Store the result in the ledger.
    #[serde(default = "default_true")]
    pub save: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BatchGenerateRequest {
    pub prompts: Vec<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_true")]
    pub format_prompts: bool,
    /// Echo every prompt/response pair in the summary instead of just the status.
    #[serde(default = "default_true")]
    pub include_results: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ReadResultsRequest {
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SingleGeneration {
    pub model: String,
    pub prompt: String,
    pub response: String,
    /// The stored row, absent when saving was turned off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<GenerationRecord>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub prompt_index: i64,
    pub prompt: String,
    pub response: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub model: String,
    pub total_prompts: usize,
    pub batch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<BatchItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Sequences model loading, generation and persistence for tool calls.
pub struct GenerationService<R: GenerationRepository, P: InferenceProvider> {
    repo: Arc<R>,
    sessions: Mutex<ModelSessionCache<P>>,
    default_model: String,
}

impl<R: GenerationRepository, P: InferenceProvider> GenerationService<R, P> {
    pub async fn new(
        mut repo: R,
        sessions: ModelSessionCache<P>,
        default_model: impl Into<String>,
    ) -> Result<Self> {
        repo.initialize().await?;
        let default_model = default_model.into();
        info!(
            "Generation service initialized (default model: {}, cache policy: {})",
            default_model,
            sessions.policy()
        );
        Ok(Self {
            repo: Arc::new(repo),
            sessions: Mutex::new(sessions),
            default_model,
        })
    }

    /// Model a request runs against, before any validation.
    pub fn resolve_model_name(&self, requested: Option<&str>) -> String {
        requested.unwrap_or(&self.default_model).to_string()
    }

    pub async fn single_generate(&self, req: SingleGenerateRequest) -> Result<SingleGeneration> {
        let model_name = self.validated_model_name(req.model_name.as_deref())?;
        let params = validated_parameters(req.max_tokens, req.temperature, req.verbose)?;

        let response = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions.ensure_loaded(&model_name)?;
            session
                .provider
                .generate(session.model, session.tokenizer, &req.prompt, &params)
                .map_err(ServiceError::Generation)?
        };
        debug!("Generated {} bytes with {}", response.len(), model_name);

        let record = if req.save {
            let record = NewGenerationRecord::new(&model_name, &req.prompt, &response)
                .with_parameters(Some(req.max_tokens), Some(req.temperature));
            Some(self.repo.insert(record).await?)
        } else {
            None
        };

        Ok(SingleGeneration {
            model: model_name,
            prompt: req.prompt,
            response,
            record,
        })
    }

    pub async fn batch_generate(&self, req: BatchGenerateRequest) -> Result<BatchSummary> {
        if req.prompts.is_empty() {
            return Err(ServiceError::Validation(
                "prompts must contain at least one prompt".to_string(),
            ));
        }
        let model_name = self.validated_model_name(req.model_name.as_deref())?;
        let params = validated_parameters(req.max_tokens, req.temperature, req.verbose)?;
        info!(
            "Batch generation of {} prompts with {} (max_tokens: {})",
            req.prompts.len(),
            model_name,
            req.max_tokens
        );

        let responses = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions.ensure_loaded(&model_name)?;
            session
                .provider
                .batch_generate(
                    session.model,
                    session.tokenizer,
                    &req.prompts,
                    &params,
                    req.format_prompts,
                )
                .map_err(ServiceError::Generation)?
        };
        if responses.len() != req.prompts.len() {
            return Err(ServiceError::Generation(InferenceError::TextGenerationError(
                format!(
                    "provider returned {} responses for {} prompts",
                    responses.len(),
                    req.prompts.len()
                ),
            )));
        }

        let batch_id = new_batch_id();
        let records = req
            .prompts
            .iter()
            .zip(&responses)
            .enumerate()
            .map(|(i, (prompt, response))| {
                NewGenerationRecord::new(&model_name, prompt, response)
                    .with_parameters(Some(req.max_tokens), Some(req.temperature))
                    .in_batch(&batch_id, i as i64)
            })
            .collect();
        self.repo.insert_batch(records).await?;
        info!("Batch {} saved ({} prompts)", batch_id, req.prompts.len());

        let total_prompts = req.prompts.len();
        let (results, status) = if req.include_results {
            let items = req
                .prompts
                .into_iter()
                .zip(responses)
                .enumerate()
                .map(|(i, (prompt, response))| BatchItem {
                    prompt_index: i as i64,
                    prompt,
                    response,
                })
                .collect();
            (Some(items), None)
        } else {
            (None, Some("completed".to_string()))
        };

        Ok(BatchSummary {
            model: model_name,
            total_prompts,
            batch_id,
            results,
            status,
        })
    }

    /// Reads stored results. A batch id wins over a model name, which wins
    /// over plain recency; the limit is ignored for batch lookups.
    pub async fn read_results(&self, req: ReadResultsRequest) -> Result<Vec<GenerationRecord>> {
        let batch_id = req.batch_id.filter(|id| !id.is_empty());
        if let Some(batch_id) = batch_id {
            return Ok(self.repo.query_by_batch(&batch_id).await?);
        }

        let limit = validated_limit(req.limit)?;
        match req.model_name.filter(|name| !name.is_empty()) {
            Some(model_name) => Ok(self.repo.query_by_model(&model_name, limit).await?),
            None => Ok(self.repo.query_recent(limit).await?),
        }
    }

    pub async fn model_info(&self) -> SessionStatus {
        self.sessions.lock().await.current_status()
    }

    fn validated_model_name(&self, requested: Option<&str>) -> Result<String> {
        let model_name = self.resolve_model_name(requested);
        if model_name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "model_name must not be empty".to_string(),
            ));
        }
        Ok(model_name)
    }
}

fn validated_parameters(
    max_tokens: i64,
    temperature: f64,
    verbose: bool,
) -> Result<GenerationParameters> {
    if max_tokens <= 0 {
        return Err(ServiceError::Validation(format!(
            "max_tokens must be positive, got {}",
            max_tokens
        )));
    }
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(ServiceError::Validation(format!(
            "temperature must be a non-negative number, got {}",
            temperature
        )));
    }
    Ok(GenerationParameters {
        max_tokens,
        temperature,
        verbose,
    })
}

fn validated_limit(limit: Option<i64>) -> Result<NonZeroU32> {
    let limit = limit.unwrap_or(DEFAULT_READ_LIMIT);
    if limit <= 0 {
        return Err(ServiceError::Validation(format!(
            "limit must be a positive integer, got {}",
            limit
        )));
    }
    // Larger limits than the store can express just mean "everything".
    let clamped = u32::try_from(limit).unwrap_or(u32::MAX);
    NonZeroU32::new(clamped).ok_or_else(|| {
        ServiceError::Validation(format!("limit must be a positive integer, got {}", limit))
    })
}
