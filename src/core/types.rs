use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// One persona's proposal for the next prompt. An empty `updated_prompt`
/// marks a persona that failed this round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub persona: String,
    pub updated_prompt: String,
    pub key_improvements: Vec<String>,
}

impl Suggestion {
    pub fn empty(persona: impl Into<String>) -> Self {
        Self { persona: persona.into(), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.updated_prompt.trim().is_empty()
    }
}

/// Suggestions keyed by persona name.
pub type SuggestionMap = BTreeMap<String, Suggestion>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundResult {
    pub updated_prompt: String,
    pub key_improvements: Vec<String>,
}

impl RoundResult {
    /// Result that keeps the prompt as it was.
    pub fn unchanged(prompt: &str) -> Self {
        Self { updated_prompt: prompt.to_string(), key_improvements: Vec::new() }
    }
}

// --- Structured response contracts ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SuggestionResponse {
    #[schemars(description = "The rewritten prompt, ready to be sent to the model.")]
    pub updated_prompt: String,
    #[serde(deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    #[schemars(description = "Short statements of what was changed and why.")]
    pub key_improvements: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ArbitrationResponse {
    #[schemars(description = "The merged prompt for the next round.")]
    pub updated_prompt: String,
    #[serde(deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub evaluation: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub key_improvements: Vec<String>,
    #[schemars(description = "The single best member prompt, verbatim.")]
    pub best_prompt: String,
    #[serde(deserialize_with = "string_or_list")]
    #[schemars(with = "Vec<String>")]
    pub best_prompt_evaluation: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OutputAnalysis {
    #[serde(deserialize_with = "flatten_text")]
    #[schemars(with = "String")]
    #[schemars(description = "What the prompt does well, judged by its output.")]
    pub good_parts: String,
    #[serde(deserialize_with = "flatten_text")]
    #[schemars(with = "String")]
    #[schemars(description = "Weaknesses of the prompt, judged by its output.")]
    pub bad_parts: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PromptAnalysis {
    #[schemars(description = "Name of the language the prompt is written in, in English.")]
    pub language: String,
    pub intention_and_purpose: String,
}

/// Accepts `"a"`, `["a", "b"]` or `null`.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<serde_json::Value>),
        Null,
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(items) => items.into_iter().map(value_to_text).collect(),
        OneOrMany::Null => Vec::new(),
    })
}

/// Models sometimes answer a text field with a list; join it.
fn flatten_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(items) => {
            items.into_iter().map(value_to_text).collect::<Vec<_>>().join("\n")
        }
        other => value_to_text(other),
    })
}

fn value_to_text(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

// --- Session outcome ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RoundsExhausted,
    InvalidPrompt,
    EmptyOutput,
    GatewayFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub final_prompt: String,
    pub rounds_completed: u32,
    pub stop_reason: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_lowercase_role() {
        let v = serde_json::to_value(Message::system("hi")).unwrap();
        assert_eq!(v, serde_json::json!({ "role": "system", "content": "hi" }));
    }

    #[test]
    fn key_improvements_accepts_string_or_list() {
        let single: SuggestionResponse =
            serde_json::from_str(r#"{"updated_prompt":"p","key_improvements":"clearer"}"#).unwrap();
        assert_eq!(single.key_improvements, vec!["clearer"]);

        let many: SuggestionResponse =
            serde_json::from_str(r#"{"updated_prompt":"p","key_improvements":["a", 2]}"#).unwrap();
        assert_eq!(many.key_improvements, vec!["a", "2"]);

        let missing: SuggestionResponse =
            serde_json::from_str(r#"{"updated_prompt":"p"}"#).unwrap();
        assert!(missing.key_improvements.is_empty());
    }

    #[test]
    fn analysis_joins_list_fields() {
        let a: OutputAnalysis =
            serde_json::from_str(r#"{"good_parts":["short","clear"],"bad_parts":null}"#).unwrap();
        assert_eq!(a.good_parts, "short\nclear");
        assert_eq!(a.bad_parts, "");
    }

    #[test]
    fn arbitration_defaults_missing_fields() {
        let r: ArbitrationResponse = serde_json::from_str(r#"{"updated_prompt":"x"}"#).unwrap();
        assert_eq!(r.updated_prompt, "x");
        assert!(r.key_improvements.is_empty());
        assert!(r.best_prompt.is_empty());
    }

    #[test]
    fn blank_suggestion_is_empty() {
        assert!(Suggestion::empty("Caspar").is_empty());
        let s = Suggestion {
            persona: "c".into(),
            updated_prompt: "  \n".into(),
            key_improvements: vec![],
        };
        assert!(s.is_empty());
    }
}
