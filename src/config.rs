use crate::error::MetaError;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 2000;

/// Runtime settings, layered as: defaults < environment (`.env` included) < CLI flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_prompt_chars: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub dump_dir: Option<PathBuf>,
    /// Propagate primary-completion failures instead of stopping quietly.
    pub strict: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            timeout_secs: 60,
            max_retries: 3,
            dump_dir: None,
            strict: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, MetaError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MetaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: get("MAGI_MODEL").unwrap_or(defaults.model),
            max_prompt_chars: parse_or(
                get("MAGI_MAX_PROMPT_CHARS"),
                "MAGI_MAX_PROMPT_CHARS",
                defaults.max_prompt_chars,
            )?,
            timeout_secs: parse_or(
                get("MAGI_TIMEOUT_SECS"),
                "MAGI_TIMEOUT_SECS",
                defaults.timeout_secs,
            )?,
            max_retries: parse_or(
                get("MAGI_MAX_RETRIES"),
                "MAGI_MAX_RETRIES",
                defaults.max_retries,
            )?,
            dump_dir: get("MAGI_DUMP_DIR").map(PathBuf::from),
            strict: parse_or(get("MAGI_STRICT"), "MAGI_STRICT", defaults.strict)?,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, MetaError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| MetaError::ConfigError(format!("{key} has an invalid value: '{v}'"))),
    }
}
