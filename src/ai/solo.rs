use super::client::CompletionGateway;
use super::prompts;
use super::schema_utils;
use crate::core::types::{Message, OutputAnalysis, RoundResult, SuggestionResponse};
use crate::error::MetaError;
use crate::orchestrator::Reviser;
use async_trait::async_trait;
use std::sync::Arc;

pub const ANALYSIS_STAGE: &str = "analysis";
pub const UPDATE_STAGE: &str = "update";

/// Single critic: analyze the output, then rewrite the prompt from that analysis.
pub struct SoloCritic {
    gateway: Arc<dyn CompletionGateway>,
    model: String,
}

impl SoloCritic {
    pub fn new(gateway: Arc<dyn CompletionGateway>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
        }
    }

    pub async fn analyze_output(
        &self,
        prompt: &str,
        output: &str,
    ) -> Result<OutputAnalysis, MetaError> {
        let system = format!(
            "{}\n{}",
            prompts::OUTPUT_ANALYSIS_PROMPT,
            schema_utils::schema_instructions::<OutputAnalysis>()
        );
        let user = format!("Prompt: {prompt}\n\nOutput: {output}");
        let messages = [Message::system(system), Message::user(user)];

        let raw = self
            .gateway
            .complete(ANALYSIS_STAGE, &self.model, &messages, true)
            .await?;
        schema_utils::parse_structured(&raw, "Analysis")
    }

    pub async fn update_prompt(
        &self,
        prompt: &str,
        analysis: &OutputAnalysis,
    ) -> Result<SuggestionResponse, MetaError> {
        let system = format!(
            "{}\n{}",
            prompts::PROMPT_UPDATE_PROMPT,
            schema_utils::schema_instructions::<SuggestionResponse>()
        );
        let user = format!(
            "Original Prompt: \"{prompt}\"\n\nGood Parts: {}\n\nBad Parts: {}",
            analysis.good_parts, analysis.bad_parts
        );
        let messages = [Message::system(system), Message::user(user)];

        let raw = self
            .gateway
            .complete(UPDATE_STAGE, &self.model, &messages, true)
            .await?;
        let parsed: SuggestionResponse = schema_utils::parse_structured(&raw, "Update")?;

        if parsed.updated_prompt.trim().is_empty() {
            return Err(MetaError::MalformedResponse(
                "Update: updated_prompt is empty".into(),
            ));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl Reviser for SoloCritic {
    async fn revise(&self, prompt: &str, output: &str, _purpose: Option<&str>) -> RoundResult {
        let analysis = match self.analyze_output(prompt, output).await {
            Ok(a) => a,
            Err(e) => {
                log::warn!(target: "magi::solo", "Analysis failed: {e}");
                OutputAnalysis::default()
            }
        };
        log::info!(target: "magi::solo", "Good Parts: {}", analysis.good_parts);
        log::info!(target: "magi::solo", "Bad Parts: {}", analysis.bad_parts);

        match self.update_prompt(prompt, &analysis).await {
            Ok(update) => RoundResult {
                updated_prompt: update.updated_prompt,
                key_improvements: update.key_improvements,
            },
            Err(e) => {
                log::error!(target: "magi::solo", "Update failed, keeping the prompt: {e}");
                RoundResult::unchanged(prompt)
            }
        }
    }
}
