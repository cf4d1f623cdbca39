use crate::config::Settings;
use crate::core::types::Message;
use crate::error::MetaError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Duration};
use uuid::Uuid;

/// Anything that can turn a list of role-tagged messages into text.
///
/// `stage` names the caller (`primary`, a persona name, `arbiter`, ...) for
/// logs and response dumps. When `want_structured` is set the reply is
/// expected to be a JSON object; callers still treat it as untrusted text and
/// parse it themselves.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(
        &self,
        stage: &str,
        model: &str,
        messages: &[Message],
        want_structured: bool,
    ) -> Result<String, MetaError>;
}

/// Chat-completions client for OpenAI and API-compatible servers.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_base: Duration,
    dump_dir: Option<PathBuf>,
}

impl OpenAiClient {
    pub fn new(settings: &Settings) -> Result<Self, MetaError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| MetaError::ConfigError("OPENAI_API_KEY must be set".into()))?;

        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: settings.max_retries.max(1),
            retry_base: Duration::from_secs(1),
            dump_dir: settings.dump_dir.clone(),
        })
    }

    /// Overrides the first backoff step (doubles on every retry).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Longest one `complete` call can take: every attempt running into the
    /// request timeout, plus the backoff sleeps between attempts.
    pub fn max_call_duration(&self) -> Duration {
        let backoff: Duration = (0..self.max_retries - 1)
            .map(|i| self.retry_base * 2u32.pow(i))
            .sum();
        self.timeout * self.max_retries + backoff
    }

    async fn complete_attempt(
        &self,
        stage: &str,
        model: &str,
        messages: &[Message],
        want_structured: bool,
    ) -> Result<String, MetaError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut payload = json!({
            "model": model,
            "messages": messages,
        });
        if want_structured {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let err_text = res.text().await.unwrap_or_default();
            log::error!(target: "magi::client", "[{stage}] API Error: {}", err_text);
            return Err(MetaError::GatewayError(format!(
                "API Error {status}: {err_text}"
            )));
        }

        let body: Value = res.json().await?;

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| MetaError::GatewayError("No text content returned".into()))?;

        let text = if want_structured {
            clean_json_block(text)
        } else {
            text.to_string()
        };

        self.dump_response(stage, &text);

        Ok(text)
    }

    fn dump_response(&self, stage: &str, text: &str) {
        let Some(dir) = &self.dump_dir else { return };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let filename = format!(
            "llm_response_{}_{}_{}.json",
            safe_stage(stage),
            timestamp,
            Uuid::new_v4().simple()
        );
        let path = dir.join(filename);

        if let Err(e) = fs::write(&path, text) {
            log::warn!(
                target: "magi::client",
                "Failed to dump response to {}: {}",
                path.display(),
                e
            );
        } else {
            log::debug!(
                target: "magi::client",
                "💾 LLM Response dumped to '{}'",
                path.display()
            );
        }
    }
}

#[async_trait]
impl CompletionGateway for OpenAiClient {
    async fn complete(
        &self,
        stage: &str,
        model: &str,
        messages: &[Message],
        want_structured: bool,
    ) -> Result<String, MetaError> {
        let max_retries = self.max_retries;

        for attempt in 1..=max_retries {
            match self
                .complete_attempt(stage, model, messages, want_structured)
                .await
            {
                Ok(text) => return Ok(text),
                Err(e) => {
                    log::warn!(
                        target: "magi::client",
                        "[{stage}] Attempt {attempt}/{max_retries} failed: {e}"
                    );
                    if attempt == max_retries {
                        return Err(e);
                    }
                    sleep(self.retry_base * 2u32.pow(attempt - 1)).await;
                }
            }
        }
        Err(MetaError::GatewayError("Max retries exceeded".into()))
    }
}

/// Strips a ```json fence, but only one that wraps the whole reply.
pub fn clean_json_block(text: &str) -> String {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed.to_string();
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim().to_string()
}

/// File-name-safe form of a stage label.
fn safe_stage(stage: &str) -> String {
    let cleaned: String = stage
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "call".to_string()
    } else {
        cleaned.to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::persona::Persona;

    fn settings_for(url: &str) -> Settings {
        Settings {
            api_key: Some("test-key".into()),
            base_url: url.to_string(),
            max_retries: 2,
            ..Settings::default()
        }
    }

    fn completion_body(content: &str) -> String {
        json!({ "choices": [{ "message": { "content": content } }] }).to_string()
    }

    #[test]
    fn strips_json_fences() {
        assert_eq!(clean_json_block("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(clean_json_block("```\n{}\n```"), "{}");
        assert_eq!(clean_json_block("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn leaves_fences_inside_json_values_alone() {
        let raw = r#"{"updated_prompt":"Answer with a ```python code block```"}"#;
        assert_eq!(clean_json_block(raw), raw);
        assert_eq!(clean_json_block("```"), "```");
    }

    #[test]
    fn stage_labels_become_safe_file_names() {
        assert_eq!(safe_stage("🧙 Melchior"), "Melchior");
        assert_eq!(safe_stage("prompt/analysis"), "prompt_analysis");
        assert_eq!(safe_stage("  "), "call");
    }

    #[test]
    fn requires_api_key() {
        let settings = Settings {
            api_key: None,
            ..Settings::default()
        };
        assert!(matches!(
            OpenAiClient::new(&settings),
            Err(MetaError::ConfigError(_))
        ));
    }

    #[test]
    fn max_call_duration_includes_backoff() {
        let settings = Settings {
            api_key: Some("k".into()),
            timeout_secs: 60,
            max_retries: 3,
            ..Settings::default()
        };
        let client = OpenAiClient::new(&settings).unwrap();
        // 3 x 60s of attempts + 1s + 2s of backoff
        assert_eq!(client.max_call_duration(), Duration::from_secs(183));

        let single = Settings {
            max_retries: 1,
            ..settings
        };
        let client = OpenAiClient::new(&single).unwrap();
        assert_eq!(client.max_call_duration(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn posts_chat_completion_and_reads_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "messages": [{ "role": "user", "content": "hello" }],
                "response_format": { "type": "json_object" }
            })))
            .with_status(200)
            .with_body(completion_body("```json\n{\"updated_prompt\":\"x\"}\n```"))
            .create_async()
            .await;

        let client = OpenAiClient::new(&settings_for(&server.url())).unwrap();
        let text = client
            .complete("test", "gpt-4o-mini", &[Message::user("hello")], true)
            .await
            .unwrap();

        assert_eq!(text, "{\"updated_prompt\":\"x\"}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fenced_code_inside_suggestion_survives() {
        let content = concat!(
            r#"{"updated_prompt":"Answer with a ```python code block```","#,
            r#""key_improvements":["format"]}"#
        );
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_body(completion_body(content))
            .create_async()
            .await;

        let client = OpenAiClient::new(&settings_for(&server.url())).unwrap();
        let text = client
            .complete("test", "m", &[Message::user("hi")], true)
            .await
            .unwrap();
        assert_eq!(text, content);

        let persona = Persona::new("P", "you are terse.", "m");
        let suggestion = persona
            .critique_and_suggest(&client, "Write code", "print(1)")
            .await;
        assert_eq!(
            suggestion.updated_prompt,
            "Answer with a ```python code block```"
        );
        assert_eq!(suggestion.key_improvements, vec!["format"]);
    }

    #[tokio::test]
    async fn plain_request_omits_response_format() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::Json(json!({
                "model": "m",
                "messages": [{ "role": "user", "content": "hi" }]
            })))
            .with_body(completion_body("plain answer"))
            .create_async()
            .await;

        let client = OpenAiClient::new(&settings_for(&server.url())).unwrap();
        let text = client
            .complete("primary", "m", &[Message::user("hi")], false)
            .await
            .unwrap();

        assert_eq!(text, "plain answer");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_then_reports_gateway_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("boom")
            .expect(2)
            .create_async()
            .await;

        let client = OpenAiClient::new(&settings_for(&server.url()))
            .unwrap()
            .with_retry_base(Duration::from_millis(1));
        let err = client
            .complete("primary", "m", &[Message::user("hi")], false)
            .await
            .unwrap_err();

        assert!(matches!(err, MetaError::GatewayError(ref msg) if msg.contains("500")));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_dumps_do_not_overwrite_each_other() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_body(completion_body("{\"updated_prompt\":\"saved\"}"))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            dump_dir: Some(dir.path().to_path_buf()),
            ..settings_for(&server.url())
        };
        let client = OpenAiClient::new(&settings).unwrap();
        let messages = [Message::user("hi")];

        let (a, b) = tokio::join!(
            client.complete("🧙 Melchior", "gpt-4o-mini", &messages, true),
            client.complete("🧙 Melchior", "gpt-4o-mini", &messages, true),
        );
        a.unwrap();
        b.unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names
            .iter()
            .all(|n| n.starts_with("llm_response_Melchior_")));
    }
}
