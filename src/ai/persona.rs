use super::client::CompletionGateway;
use super::prompts;
use super::schema_utils;
use crate::core::types::{Message, Suggestion, SuggestionResponse};
use crate::error::MetaError;
use serde::Deserialize;

/// A named critic. Personas differ only by their data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Persona {
    pub name: String,
    pub behavior: String,
    #[serde(default)]
    pub model: String,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        behavior: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            behavior: behavior.into(),
            model: model.into(),
        }
    }

    /// The built-in Melchior / Balthasar / Caspar council, all on `model`.
    pub fn default_council(model: &str) -> Vec<Persona> {
        prompts::DEFAULT_PERSONAS
            .iter()
            .map(|(name, behavior)| Persona::new(*name, *behavior, model))
            .collect()
    }

    pub fn messages(&self, original_prompt: &str, observed_output: &str) -> Vec<Message> {
        let system = format!(
            "Your name is {} and {}\n{}\n{}",
            self.name,
            self.behavior,
            prompts::REFINEMENT_PROMPT,
            schema_utils::schema_instructions::<SuggestionResponse>()
        );
        let user = format!("Prompt: {original_prompt}\n\nOutput: {observed_output}\n\n");
        vec![Message::system(system), Message::user(user)]
    }

    pub async fn try_critique(
        &self,
        gateway: &dyn CompletionGateway,
        original_prompt: &str,
        observed_output: &str,
    ) -> Result<Suggestion, MetaError> {
        let messages = self.messages(original_prompt, observed_output);
        let raw = gateway
            .complete(&self.name, &self.model, &messages, true)
            .await?;

        if raw.trim().is_empty() {
            return Err(MetaError::MalformedResponse(format!(
                "{}: no updated prompt returned",
                self.name
            )));
        }

        let parsed: SuggestionResponse = schema_utils::parse_structured(&raw, &self.name)?;
        Ok(Suggestion {
            persona: self.name.clone(),
            updated_prompt: parsed.updated_prompt,
            key_improvements: parsed.key_improvements,
        })
    }

    /// Never fails: any gateway or parse problem becomes an empty suggestion.
    pub async fn critique_and_suggest(
        &self,
        gateway: &dyn CompletionGateway,
        original_prompt: &str,
        observed_output: &str,
    ) -> Suggestion {
        match self
            .try_critique(gateway, original_prompt, observed_output)
            .await
        {
            Ok(suggestion) => {
                log::info!(
                    target: "magi::persona",
                    "[{}] Updated Prompt: {}",
                    self.name,
                    suggestion.updated_prompt
                );
                suggestion
            }
            Err(e) => {
                log::warn!(
                    target: "magi::persona",
                    "[{}] No usable suggestion: {}",
                    self.name,
                    e
                );
                Suggestion::empty(&self.name)
            }
        }
    }
}
