use super::arbiter::Arbiter;
use super::client::CompletionGateway;
use super::persona::Persona;
use crate::core::types::{RoundResult, Suggestion, SuggestionMap};
use crate::error::MetaError;
use crate::orchestrator::Reviser;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Duration;

/// Personas critique in parallel, then the arbiter merges their suggestions.
pub struct Council {
    gateway: Arc<dyn CompletionGateway>,
    personas: Vec<Arc<Persona>>,
    arbiter: Arbiter,
    task_timeout: Option<Duration>,
}

impl Council {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        personas: Vec<Persona>,
        arbiter: Arbiter,
    ) -> Result<Self, MetaError> {
        if personas.is_empty() {
            return Err(MetaError::ConfigError(
                "A council needs at least one persona".into(),
            ));
        }

        let mut seen = HashSet::new();
        for persona in &personas {
            if !seen.insert(persona.name.as_str()) {
                return Err(MetaError::ConfigError(format!(
                    "Duplicate persona name: {}",
                    persona.name
                )));
            }
        }

        Ok(Self {
            gateway,
            personas: personas.into_iter().map(Arc::new).collect(),
            arbiter,
            task_timeout: None,
        })
    }

    /// Bounds each persona task; a task that runs over counts as failed.
    pub fn with_task_timeout(mut self, limit: Duration) -> Self {
        self.task_timeout = Some(limit);
        self
    }

    pub fn personas(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter().map(|p| p.as_ref())
    }

    /// Runs every persona concurrently and waits for all of them.
    pub async fn gather(&self, prompt: &str, output: &str) -> SuggestionMap {
        let (names, handles): (Vec<String>, Vec<_>) = self
            .personas
            .iter()
            .map(|persona| {
                let persona = Arc::clone(persona);
                let gateway = Arc::clone(&self.gateway);
                let prompt = prompt.to_string();
                let output = output.to_string();
                let timeout = self.task_timeout;

                let name = persona.name.clone();
                let handle = tokio::spawn(async move {
                    let critique =
                        persona.critique_and_suggest(gateway.as_ref(), &prompt, &output);
                    match timeout {
                        Some(limit) => tokio::time::timeout(limit, critique).await.map_err(|_| {
                            MetaError::TaskFailed(format!("timed out after {limit:?}"))
                        }),
                        None => Ok(critique.await),
                    }
                });
                (name, handle)
            })
            .unzip();

        let results = join_all(handles).await;

        let mut suggestions = SuggestionMap::new();
        for (name, result) in names.into_iter().zip(results) {
            let suggestion = match result {
                Ok(Ok(suggestion)) => suggestion,
                Ok(Err(e)) => {
                    log::error!(target: "magi::council", "[{name}] {e}");
                    Suggestion::empty(&name)
                }
                Err(join_err) => {
                    let e = MetaError::TaskFailed(join_err.to_string());
                    log::error!(target: "magi::council", "[{name}] {e}");
                    Suggestion::empty(&name)
                }
            };
            suggestions.insert(name, suggestion);
        }
        suggestions
    }
}

#[async_trait]
impl Reviser for Council {
    async fn revise(&self, prompt: &str, output: &str, purpose: Option<&str>) -> RoundResult {
        let suggestions = self.gather(prompt, output).await;

        let usable = suggestions.values().filter(|s| !s.is_empty()).count();
        log::info!(
            target: "magi::council",
            "{usable}/{} personas returned a suggestion",
            suggestions.len()
        );

        self.arbiter
            .merge(self.gateway.as_ref(), prompt, &suggestions, purpose)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::testing::{CallKind, ScriptedGateway};
    use crate::core::types::Message;

    fn trio() -> Vec<Persona> {
        vec![
            Persona::new("Melchior", "you are precise.", "m"),
            Persona::new("Balthasar", "you are practical.", "m"),
            Persona::new("Caspar", "you are curious.", "m"),
        ]
    }

    #[test]
    fn rejects_empty_and_duplicate_rosters() {
        let gw: Arc<dyn CompletionGateway> =
            Arc::new(ScriptedGateway::new(|_, _| Ok(String::new())));
        assert!(Council::new(Arc::clone(&gw), vec![], Arbiter::new("m")).is_err());

        let dupes = vec![Persona::new("A", "x", "m"), Persona::new("A", "y", "m")];
        assert!(matches!(
            Council::new(gw, dupes, Arbiter::new("m")),
            Err(MetaError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn gathers_one_suggestion_per_persona_keyed_by_name() {
        let gateway = Arc::new(ScriptedGateway::new(|call, _| {
            Ok(format!(r#"{{"updated_prompt":"from {}"}}"#, call.stage))
        }));
        let council = Council::new(gateway.clone(), trio(), Arbiter::new("m")).unwrap();

        let map = council.gather("p", "o").await;

        assert_eq!(map.len(), 3);
        assert_eq!(map["Caspar"].updated_prompt, "from Caspar");
        assert_eq!(map["Melchior"].updated_prompt, "from Melchior");
        assert_eq!(gateway.count(CallKind::Persona), 3);
    }

    #[tokio::test]
    async fn panicking_task_does_not_cancel_siblings() {
        let gateway = Arc::new(ScriptedGateway::new(|call, _| {
            if call.stage == "Balthasar" {
                panic!("persona task blew up");
            }
            Ok(format!(r#"{{"updated_prompt":"from {}"}}"#, call.stage))
        }));
        let council = Council::new(gateway.clone(), trio(), Arbiter::new("m")).unwrap();

        let map = council.gather("p", "o").await;

        assert!(map["Balthasar"].is_empty());
        assert_eq!(map["Melchior"].updated_prompt, "from Melchior");
        assert_eq!(map["Caspar"].updated_prompt, "from Caspar");
    }

    #[tokio::test]
    async fn slow_persona_times_out_as_empty() {
        struct Slow;

        #[async_trait]
        impl CompletionGateway for Slow {
            async fn complete(
                &self,
                _stage: &str,
                _model: &str,
                _messages: &[Message],
                _want_structured: bool,
            ) -> Result<String, MetaError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(r#"{"updated_prompt":"late"}"#.into())
            }
        }

        let council = Council::new(Arc::new(Slow), trio(), Arbiter::new("m"))
            .unwrap()
            .with_task_timeout(Duration::from_millis(20));

        let map = council.gather("p", "o").await;
        assert!(map.values().all(Suggestion::is_empty));
    }

    #[tokio::test]
    async fn malformed_persona_still_reaches_arbiter() {
        let gateway = Arc::new(ScriptedGateway::new(|call, _| match call.kind {
            CallKind::Arbiter => {
                assert!(call.user().contains("\"Caspar\": \"\""));
                Ok(r#"{"updated_prompt":"merged","key_improvements":[]}"#.into())
            }
            _ if call.stage == "Caspar" => Ok("garbage".into()),
            _ => Ok(r#"{"updated_prompt":"fine"}"#.into()),
        }));
        let council = Council::new(gateway.clone(), trio(), Arbiter::new("m")).unwrap();

        let result = council.revise("p", "o", None).await;

        assert_eq!(result.updated_prompt, "merged");
        assert_eq!(gateway.count(CallKind::Arbiter), 1);
    }
}
