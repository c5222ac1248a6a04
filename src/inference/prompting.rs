use std::path::Path;

use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};

use crate::inference::errors::{InferenceError, Result};

/*
Some good docs:
- https://huggingface.co/blog/FriendliAI/custom-chat-template
*/

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

pub trait ChatTemplate: Sync + Send {
    fn format_messages(&self, messages: &[Message], add_generation_prompt: bool) -> Result<String>;

    /// Wraps a single user prompt, leaving the assistant turn open.
    fn format_prompt(&self, prompt: &str) -> Result<String> {
        self.format_messages(&[Message::user(prompt)], true)
    }
}

#[derive(Debug, Clone)]
pub struct SimpleChatTemplate {
    pub prefix: &'static str,
    pub suffix: &'static str,
}

impl ChatTemplate for SimpleChatTemplate {
    fn format_messages(&self, messages: &[Message], _add_generation_prompt: bool) -> Result<String> {
        let input = messages
            .iter()
            .map(|msg| msg.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("{}{}{}", self.prefix, input, self.suffix))
    }
}

pub const CHAT: SimpleChatTemplate = SimpleChatTemplate {
    prefix: "User: ",
    suffix: "\nAssistant:",
};

#[derive(Debug, Clone)]
pub struct JinjaChatTemplate {
    name: String,
    env: Environment<'static>,
}

impl JinjaChatTemplate {
    pub fn from_source(name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let name: String = name.into();
        let mut env = Environment::new();
        // enable python methods such as .strip()
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        env.add_template_owned(name.clone(), source.into())
            .map_err(|e| InferenceError::ChatTemplateError(format!("invalid template: {}", e)))?;
        Ok(Self { name, env })
    }

    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::ChatTemplateError(format!("Failed to read template file: {}", e))
        })?;
        Self::from_source(name, source)
    }
}

impl ChatTemplate for JinjaChatTemplate {
    fn format_messages(&self, messages: &[Message], add_generation_prompt: bool) -> Result<String> {
        let tmpl = self.env.get_template(self.name.as_str()).map_err(|e| {
            InferenceError::ChatTemplateError(format!("error fetching template: {}", e))
        })?;
        tmpl.render(context!(messages, add_generation_prompt))
            .map_err(|e| {
                InferenceError::ChatTemplateError(format!("error rendering template: {}", e))
            })
    }
}
