use crate::inference::errors::Result;

/// Sampling knobs shared by single and batch generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParameters {
    pub max_tokens: i64,
    pub temperature: f64,
    pub verbose: bool,
}

/// Loads models and runs text generation on them.
///
/// Calls block until generation finishes and cannot be cancelled.
pub trait InferenceProvider: Send + Sync {
    type Model: Send;
    type Tokenizer: Send;

    fn load(&self, model_name: &str) -> Result<(Self::Model, Self::Tokenizer)>;

    fn generate(
        &self,
        model: &mut Self::Model,
        tokenizer: &Self::Tokenizer,
        prompt: &str,
        params: &GenerationParameters,
    ) -> Result<String>;

    /// Returns one response per prompt, in prompt order.
    ///
    /// With `format_prompts` set, each prompt is wrapped in the model's chat
    /// template before generation.
    fn batch_generate(
        &self,
        model: &mut Self::Model,
        tokenizer: &Self::Tokenizer,
        prompts: &[String],
        params: &GenerationParameters,
        format_prompts: bool,
    ) -> Result<Vec<String>>;
}
