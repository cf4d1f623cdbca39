use crate::ai::client::CompletionGateway;
use crate::ai::translator::{self, Translator, WORKING_LANGUAGE};
use crate::config::Settings;
use crate::core::types::{Message, Outcome, RoundResult, StopReason};
use crate::core::validate::validate_prompt;
use crate::error::MetaError;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub const PRIMARY_STAGE: &str = "primary";

/// Turns one round's (prompt, output) pair into the next prompt.
#[async_trait]
pub trait Reviser: Send + Sync {
    async fn revise(&self, prompt: &str, output: &str, purpose: Option<&str>) -> RoundResult;
}

/// Runs a prompt, has the reviser rewrite it, and repeats for a fixed number of rounds.
///
/// A session only stops early when the prompt fails validation or the model
/// returns nothing for it; in both cases the last prompt that entered a round
/// is returned.
pub struct RefinementSession {
    gateway: Arc<dyn CompletionGateway>,
    reviser: Box<dyn Reviser>,
    translator: Option<Translator>,
    model: String,
    max_prompt_chars: usize,
    strict: bool,
    id: String,
}

impl RefinementSession {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        reviser: Box<dyn Reviser>,
        settings: &Settings,
    ) -> Self {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            gateway,
            reviser,
            translator: None,
            model: settings.model.clone(),
            max_prompt_chars: settings.max_prompt_chars,
            strict: settings.strict,
            id,
        }
    }

    /// Work in English: translate the prompt in before round one and the
    /// result back out after the last round.
    pub fn with_translation(mut self, translator: Translator) -> Self {
        self.translator = Some(translator);
        self
    }

    pub async fn run(
        &self,
        initial_prompt: &str,
        rounds: u32,
        fixed_user_prompt: Option<&str>,
    ) -> Result<String, MetaError> {
        let outcome = self.refine(initial_prompt, rounds, fixed_user_prompt).await?;
        Ok(outcome.final_prompt)
    }

    pub async fn refine(
        &self,
        initial_prompt: &str,
        rounds: u32,
        fixed_user_prompt: Option<&str>,
    ) -> Result<Outcome, MetaError> {
        let Some(translator) = self.translator.as_ref().filter(|_| rounds > 0) else {
            return self
                .refine_rounds(initial_prompt.to_string(), rounds, fixed_user_prompt, None)
                .await;
        };

        let analysis = match translator.analyze(initial_prompt).await {
            Ok(a) => a,
            Err(e) => {
                log::warn!(
                    target: "magi::session",
                    "[{}] Prompt analysis failed, skipping translation: {e}",
                    self.id
                );
                Default::default()
            }
        };
        log::info!(
            target: "magi::session",
            "[{}] Language: {} | Purpose: {}",
            self.id,
            analysis.language,
            analysis.intention_and_purpose
        );

        let language = analysis.language.trim();
        let purpose =
            Some(analysis.intention_and_purpose.as_str()).filter(|p| !p.trim().is_empty());
        let needs_translation = !translator::is_working_language(language);

        let working_prompt = if needs_translation {
            self.translate_or_keep(translator, initial_prompt, WORKING_LANGUAGE).await
        } else {
            initial_prompt.to_string()
        };

        let mut outcome = self
            .refine_rounds(working_prompt, rounds, fixed_user_prompt, purpose)
            .await?;

        if needs_translation {
            outcome.final_prompt = self
                .translate_or_keep(translator, &outcome.final_prompt, language)
                .await;
        }
        log::info!(
            target: "magi::session",
            "[{}] Final Prompt: {}",
            self.id,
            outcome.final_prompt
        );
        Ok(outcome)
    }

    async fn translate_or_keep(
        &self,
        translator: &Translator,
        text: &str,
        language: &str,
    ) -> String {
        match translator.translate(text, language).await {
            Ok(translated) => translated,
            Err(e) => {
                log::warn!(
                    target: "magi::session",
                    "[{}] Translation into {language} failed: {e}",
                    self.id
                );
                text.to_string()
            }
        }
    }

    async fn refine_rounds(
        &self,
        initial_prompt: String,
        rounds: u32,
        fixed_user_prompt: Option<&str>,
        purpose: Option<&str>,
    ) -> Result<Outcome, MetaError> {
        let mut current = initial_prompt;
        let mut remaining = rounds;
        let mut completed = 0;

        while remaining > 0 {
            log::info!(
                target: "magi::session",
                "[{}] ------------------------ Round {}/{} ------------------------",
                self.id,
                completed + 1,
                rounds
            );

            if let Err(e) = validate_prompt(&current, self.max_prompt_chars) {
                log::warn!(target: "magi::session", "[{}] Stopping: {e}", self.id);
                return Ok(self.finish(current, completed, StopReason::InvalidPrompt));
            }

            let messages = primary_messages(&current, fixed_user_prompt);
            log::info!(target: "magi::session", "[{}] Prompt: {}", self.id, current);
            log::debug!(target: "magi::session", "[{}] Messages: {:?}", self.id, messages);

            let output = match self
                .gateway
                .complete(PRIMARY_STAGE, &self.model, &messages, false)
                .await
            {
                Ok(output) => output,
                Err(e) if self.strict => return Err(e),
                Err(e) => {
                    log::error!(
                        target: "magi::session",
                        "[{}] Completion failed: {e}",
                        self.id
                    );
                    return Ok(self.finish(current, completed, StopReason::GatewayFailure));
                }
            };

            if output.trim().is_empty() {
                log::warn!(
                    target: "magi::session",
                    "[{}] Model returned no output, stopping",
                    self.id
                );
                return Ok(self.finish(current, completed, StopReason::EmptyOutput));
            }
            log::info!(target: "magi::session", "[{}] Output: {}", self.id, output);

            let result = self.reviser.revise(&current, &output, purpose).await;
            log::info!(
                target: "magi::session",
                "[{}] Updated Prompt: {}",
                self.id,
                result.updated_prompt
            );
            log::info!(
                target: "magi::session",
                "[{}] Key Improvements: {:?}",
                self.id,
                result.key_improvements
            );

            current = result.updated_prompt;
            remaining -= 1;
            completed += 1;
        }

        Ok(self.finish(current, completed, StopReason::RoundsExhausted))
    }

    fn finish(
        &self,
        final_prompt: String,
        rounds_completed: u32,
        stop_reason: StopReason,
    ) -> Outcome {
        log::info!(
            target: "magi::session",
            "[{}] Upgrade process completed after {rounds_completed} round(s): {stop_reason:?}",
            self.id
        );
        Outcome {
            final_prompt,
            rounds_completed,
            stop_reason,
        }
    }
}

/// With a fixed user prompt the prompt under refinement becomes the system message.
pub fn primary_messages(prompt: &str, fixed_user_prompt: Option<&str>) -> Vec<Message> {
    match fixed_user_prompt {
        None => vec![Message::user(prompt)],
        Some(user) => vec![Message::system(prompt), Message::user(user)],
    }
}
