use thiserror::Error;

/// Top-level error type for the Haven platform.
#[derive(Error, Debug)]
pub enum HavenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
