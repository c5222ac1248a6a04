use std::path::Path;

use tokenizers::Tokenizer as TokenizerBase;

use crate::inference::{
    errors::{InferenceError, Result},
    prompting::{CHAT, ChatTemplate},
};

// GPT-2 style end of text marker, the only EOS the bundled models use.
const END_OF_TEXT: &str = "<|endoftext|>";

pub struct Tokenizer {
    inner: TokenizerBase,
    pub chat_template: Box<dyn ChatTemplate>,
}

impl Tokenizer {
    pub fn from_file(path: &Path, chat_template: Option<Box<dyn ChatTemplate>>) -> Result<Self> {
        let inner = TokenizerBase::from_file(path)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))?;
        Ok(Self {
            inner,
            chat_template: chat_template.unwrap_or(Box::new(CHAT)),
        })
    }

    pub fn tokenize_to_ids(&self, text: &str) -> Result<Vec<i64>> {
        let enc = self
            .inner
            .encode(text, false)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))?;
        Ok(enc.get_ids().iter().map(|i| *i as i64).collect())
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))
    }

    pub fn eos_token_id(&self) -> Option<i64> {
        self.inner.token_to_id(END_OF_TEXT).map(i64::from)
    }
}
