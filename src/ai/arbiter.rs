use super::client::CompletionGateway;
use super::prompts;
use super::schema_utils;
use crate::core::types::{ArbitrationResponse, Message, RoundResult, SuggestionMap};
use crate::error::MetaError;
use std::collections::BTreeMap;

pub const ARBITER_STAGE: &str = "arbiter";

/// Merges the council's suggestions into one prompt.
#[derive(Debug, Clone)]
pub struct Arbiter {
    pub model: String,
}

impl Arbiter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn messages(
        &self,
        original_prompt: &str,
        suggestions: &SuggestionMap,
        purpose: Option<&str>,
    ) -> Vec<Message> {
        let mut system = String::new();
        if let Some(purpose) = purpose.filter(|p| !p.trim().is_empty()) {
            system.push_str(&format!(
                "Purpose of the expected user prompt: {purpose}\n"
            ));
        }
        system.push_str(prompts::ARBITER_PROMPT);
        system.push('\n');
        system.push_str(&schema_utils::schema_instructions::<ArbitrationResponse>());

        let by_name: BTreeMap<&str, &str> = suggestions
            .iter()
            .map(|(name, s)| (name.as_str(), s.updated_prompt.as_str()))
            .collect();
        let listing = serde_json::to_string_pretty(&by_name).unwrap_or_default();

        let user = format!("Original Prompt: {original_prompt}\n\nImproved Prompts:\n{listing}");
        vec![Message::system(system), Message::user(user)]
    }

    pub async fn try_merge(
        &self,
        gateway: &dyn CompletionGateway,
        original_prompt: &str,
        suggestions: &SuggestionMap,
        purpose: Option<&str>,
    ) -> Result<ArbitrationResponse, MetaError> {
        let messages = self.messages(original_prompt, suggestions, purpose);
        let raw = gateway
            .complete(ARBITER_STAGE, &self.model, &messages, true)
            .await?;
        let parsed: ArbitrationResponse = schema_utils::parse_structured(&raw, "Arbiter")?;

        if parsed.updated_prompt.trim().is_empty() {
            return Err(MetaError::MalformedResponse(
                "Arbiter: updated_prompt is empty".into(),
            ));
        }
        Ok(parsed)
    }

    /// Falls back to `(original_prompt, [])` on any failure.
    pub async fn merge(
        &self,
        gateway: &dyn CompletionGateway,
        original_prompt: &str,
        suggestions: &SuggestionMap,
        purpose: Option<&str>,
    ) -> RoundResult {
        match self
            .try_merge(gateway, original_prompt, suggestions, purpose)
            .await
        {
            Ok(resp) => {
                if !resp.best_prompt.is_empty() {
                    log::debug!(
                        target: "magi::arbiter",
                        "Best member prompt: {}",
                        resp.best_prompt
                    );
                }
                for line in resp.evaluation.iter().chain(&resp.best_prompt_evaluation) {
                    log::debug!(target: "magi::arbiter", "Evaluation: {line}");
                }
                RoundResult {
                    updated_prompt: resp.updated_prompt,
                    key_improvements: resp.key_improvements,
                }
            }
            Err(e) => {
                log::error!(
                    target: "magi::arbiter",
                    "Merge failed, keeping the original prompt: {e}"
                );
                RoundResult::unchanged(original_prompt)
            }
        }
    }
}
