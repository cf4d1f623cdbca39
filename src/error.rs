use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("API Error: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Gateway Error: {0}")]
    GatewayError(String),

    #[error("Validation Failed: {0}")]
    ValidationFailed(String),

    #[error("Malformed Response: {0}")]
    MalformedResponse(String),

    #[error("Task Failed: {0}")]
    TaskFailed(String),

    #[error("Config Error: {0}")]
    ConfigError(String),
}
