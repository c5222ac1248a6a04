//! Test doubles shared by the unit tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tempfile::TempDir;

use crate::{
    inference::{
        GenerationParameters, InferenceProvider,
        errors::{InferenceError, Result},
    },
    repository::sqlite::SQLiteGenerationRepository,
};

/// Model names the fake provider refuses to load.
pub const MISSING_MODEL: &str = "missing";

#[derive(Debug)]
pub struct FakeModel {
    pub name: String,
}

#[derive(Debug)]
pub struct FakeTokenizer {
    pub model_name: String,
}

#[derive(Default)]
struct FakeState {
    loads: Mutex<Vec<String>>,
    generate_calls: AtomicUsize,
    fail_generation: AtomicBool,
    drop_last_response: AtomicBool,
}

/// Provider that answers `"<model>:<prompt>"` and records every load attempt.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<FakeState>,
}

impl FakeProvider {
    pub fn load_count(&self) -> usize {
        self.state.loads.lock().unwrap().len()
    }

    pub fn loaded_models(&self) -> Vec<String> {
        self.state.loads.lock().unwrap().clone()
    }

    pub fn generate_calls(&self) -> usize {
        self.state.generate_calls.load(Ordering::SeqCst)
    }

    pub fn fail_generation(&self, fail: bool) {
        self.state.fail_generation.store(fail, Ordering::SeqCst);
    }

    /// Makes batch generation return one response fewer than asked for.
    pub fn drop_last_response(&self, drop: bool) {
        self.state.drop_last_response.store(drop, Ordering::SeqCst);
    }

    fn respond(&self, model: &FakeModel, prompt: &str) -> Result<String> {
        self.state.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_generation.load(Ordering::SeqCst) {
            return Err(InferenceError::TextGenerationError(
                "fake generation failure".to_string(),
            ));
        }
        Ok(format!("{}:{}", model.name, prompt))
    }
}

impl InferenceProvider for FakeProvider {
    type Model = FakeModel;
    type Tokenizer = FakeTokenizer;

    fn load(&self, model_name: &str) -> Result<(FakeModel, FakeTokenizer)> {
        self.state.loads.lock().unwrap().push(model_name.to_string());
        if model_name == MISSING_MODEL {
            return Err(InferenceError::ModelNotFound(model_name.to_string()));
        }
        Ok((
            FakeModel {
                name: model_name.to_string(),
            },
            FakeTokenizer {
                model_name: model_name.to_string(),
            },
        ))
    }

    fn generate(
        &self,
        model: &mut FakeModel,
        _tokenizer: &FakeTokenizer,
        prompt: &str,
        _params: &GenerationParameters,
    ) -> Result<String> {
        self.respond(model, prompt)
    }

    fn batch_generate(
        &self,
        model: &mut FakeModel,
        _tokenizer: &FakeTokenizer,
        prompts: &[String],
        _params: &GenerationParameters,
        format_prompts: bool,
    ) -> Result<Vec<String>> {
        let mut responses = prompts
            .iter()
            .map(|p| {
                if format_prompts {
                    self.respond(model, &format!("User: {}", p))
                } else {
                    self.respond(model, p)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        if self.state.drop_last_response.load(Ordering::SeqCst) {
            responses.pop();
        }
        Ok(responses)
    }
}

/// Opens a fresh SQLite store inside a temporary directory.
pub async fn temp_repository() -> (TempDir, SQLiteGenerationRepository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = SQLiteGenerationRepository::open(dir.path().join("results.db"))
        .await
        .unwrap();
    (dir, repo)
}
