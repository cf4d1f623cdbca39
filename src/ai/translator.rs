use super::client::CompletionGateway;
use super::prompts;
use super::schema_utils;
use crate::core::types::{Message, PromptAnalysis};
use crate::error::MetaError;
use std::sync::Arc;

pub const WORKING_LANGUAGE: &str = "English";

/// Detects a prompt's language and purpose, and translates text between languages.
pub struct Translator {
    gateway: Arc<dyn CompletionGateway>,
    model: String,
}

impl Translator {
    pub fn new(gateway: Arc<dyn CompletionGateway>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
        }
    }

    pub async fn analyze(&self, prompt: &str) -> Result<PromptAnalysis, MetaError> {
        let system = format!(
            "{}\n{}",
            prompts::PROMPT_ANALYZER_PROMPT,
            schema_utils::schema_instructions::<PromptAnalysis>()
        );
        let user = format!("Analyze the following prompt: {prompt}");
        let messages = [Message::system(system), Message::user(user)];

        let raw = self
            .gateway
            .complete("prompt_analysis", &self.model, &messages, true)
            .await?;
        schema_utils::parse_structured(&raw, "Prompt analysis")
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> Result<String, MetaError> {
        let messages = [
            Message::system(prompts::translator_prompt(target_language)),
            Message::user(format!(
                "Translate the following text into {target_language}: {text}"
            )),
        ];

        let out = self
            .gateway
            .complete("translation", &self.model, &messages, false)
            .await?;
        let out = out.trim();
        if out.is_empty() {
            return Err(MetaError::MalformedResponse(format!(
                "Empty translation into {target_language}"
            )));
        }
        Ok(out.to_string())
    }
}

/// True when `language` needs no translation to or from the working language.
pub fn is_working_language(language: &str) -> bool {
    let language = language.trim();
    language.is_empty()
        || language.eq_ignore_ascii_case(WORKING_LANGUAGE)
        || language.eq_ignore_ascii_case("en")
}
