use std::{fmt, str::FromStr, sync::Arc};

use log::{error, info};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};

use crate::{
    inference::InferenceProvider,
    repository::GenerationRepository,
    services::{
        BatchGenerateRequest, GenerationService, ReadResultsRequest, SingleGenerateRequest,
        errors::{Result, ServiceError},
    },
};

/// Tools exposed by the gateway, named as clients call them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tool {
    SingleGenerateText,
    BatchGenerateText,
    ReadResults,
    GetModelInfo,
}

impl Tool {
    pub const ALL: [Tool; 4] = [
        Tool::SingleGenerateText,
        Tool::BatchGenerateText,
        Tool::ReadResults,
        Tool::GetModelInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::SingleGenerateText => "single_generate_text",
            Tool::BatchGenerateText => "batch_generate_text",
            Tool::ReadResults => "read_results",
            Tool::GetModelInfo => "get_model_info",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::SingleGenerateText => {
                "Generate text from one prompt and store the result unless save is false."
            }
            Tool::BatchGenerateText => {
                "Generate text from several prompts in one call and store them under a shared batch id."
            }
            Tool::ReadResults => {
                "Read stored results by batch id, by model name, or the most recent ones."
            }
            Tool::GetModelInfo => "Report which model is currently loaded, without loading one.",
        }
    }
}

impl FromStr for Tool {
    type Err = ServiceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| ServiceError::Validation(format!("unknown tool '{}'", s)))
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolDescription {
    pub name: &'static str,
    pub description: &'static str,
}

/// Outcome of one tool call. Failures are reported in-band, the way tool
/// results carry errors, rather than as transport errors.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub is_error: bool,
    pub content: Value,
}

// Request fields echoed back next to an error.
#[derive(Default)]
struct ErrorContext {
    model: Option<String>,
    total_prompts: Option<usize>,
}

pub struct ToolRegistry<R: GenerationRepository, P: InferenceProvider> {
    svc: Arc<GenerationService<R, P>>,
}

impl<R: GenerationRepository, P: InferenceProvider> Clone for ToolRegistry<R, P> {
    fn clone(&self) -> Self {
        Self {
            svc: Arc::clone(&self.svc),
        }
    }
}

impl<R: GenerationRepository, P: InferenceProvider> ToolRegistry<R, P> {
    pub fn new(svc: Arc<GenerationService<R, P>>) -> Self {
        Self { svc }
    }

    pub fn list_tools(&self) -> Vec<ToolDescription> {
        Tool::ALL
            .iter()
            .map(|t| ToolDescription {
                name: t.name(),
                description: t.description(),
            })
            .collect()
    }

    pub async fn call(&self, name: &str, args: Value) -> ToolResponse {
        let mut ctx = ErrorContext::default();
        match self.dispatch(name, args, &mut ctx).await {
            Ok(content) => ToolResponse {
                is_error: false,
                content,
            },
            Err(e) => {
                error!("Error in {}: {}", name, e);
                ToolResponse {
                    is_error: true,
                    content: error_payload(&e, &ctx),
                }
            }
        }
    }

    async fn dispatch(&self, name: &str, args: Value, ctx: &mut ErrorContext) -> Result<Value> {
        let tool: Tool = name.parse()?;
        info!("Tool call: {}", tool);
        match tool {
            Tool::SingleGenerateText => {
                let req: SingleGenerateRequest = parse_args(args)?;
                ctx.model = Some(self.svc.resolve_model_name(req.model_name.as_deref()));
                let out = self.svc.single_generate(req).await?;
                to_value(&out)
            }
            Tool::BatchGenerateText => {
                let req: BatchGenerateRequest = parse_args(args)?;
                ctx.model = Some(self.svc.resolve_model_name(req.model_name.as_deref()));
                ctx.total_prompts = Some(req.prompts.len());
                let summary = self.svc.batch_generate(req).await?;
                to_value(&summary)
            }
            Tool::ReadResults => {
                let req: ReadResultsRequest = parse_args(args)?;
                let results = self.svc.read_results(req).await?;
                Ok(json!({
                    "count": results.len(),
                    "results": results,
                }))
            }
            Tool::GetModelInfo => {
                let status = self.svc.model_info().await;
                Ok(match status.model_name {
                    Some(model_name) => json!({
                        "status": "model_loaded",
                        "model_name": model_name,
                        "model_loaded": status.loaded,
                        "tokenizer_loaded": status.loaded,
                    }),
                    None => json!({
                        "status": "no_model_loaded",
                        "message": "No model is currently loaded",
                        "model_loaded": false,
                        "tokenizer_loaded": false,
                    }),
                })
            }
        }
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(args)
        .map_err(|e| ServiceError::Validation(format!("invalid arguments: {}", e)))
}

fn to_value<T: Serialize>(out: &T) -> Result<Value> {
    serde_json::to_value(out)
        .map_err(|e| ServiceError::Validation(format!("unserializable result: {}", e)))
}

fn error_payload(e: &ServiceError, ctx: &ErrorContext) -> Value {
    let mut payload = Map::new();
    payload.insert(
        "error".to_string(),
        json!({
            "kind": e.kind(),
            "message": e.to_string(),
        }),
    );
    if let Some(model) = &ctx.model {
        payload.insert("model".to_string(), json!(model));
    }
    if let Some(total) = ctx.total_prompts {
        payload.insert("total_prompts".to_string(), json!(total));
    }
    Value::Object(payload)
}
