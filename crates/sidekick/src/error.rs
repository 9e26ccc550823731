use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Delegation depth ({0}) exceeded")]
    DelegationDepthExceeded(u32),

    #[error("Configuration error: {0}")]
    Config(String),
}
