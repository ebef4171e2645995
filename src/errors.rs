use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Session unavailable at {path}: {reason}")]
    SessionUnavailable { path: PathBuf, reason: String },

    #[error("Element not found: {target} (tried {tried} strategies)")]
    ElementNotFound { target: String, tried: usize },

    #[error("Navigation timeout: {0}")]
    NavigationTimeout(String),

    #[error("Fill failed: {target}")]
    FillFailed { target: String },

    #[error("Save or publish failed: {0}")]
    SaveOrPublishFailed(String),

    #[error("Invalid article: {0}")]
    InvalidArticle(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Browser not launched")]
    BrowserNotLaunched,

    #[error("Browser driver error: {0}")]
    DriverFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Front matter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PublishError>;

impl From<anyhow::Error> for PublishError {
    fn from(err: anyhow::Error) -> Self {
        PublishError::DriverFailed(err.to_string())
    }
}

impl PublishError {
    pub fn from_driver<E: std::fmt::Display>(err: E) -> Self {
        PublishError::DriverFailed(err.to_string())
    }

    /// Lookup failures, including navigations that never settled, are what
    /// best-effort steps are allowed to swallow.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            PublishError::ElementNotFound { .. }
                | PublishError::NavigationTimeout(_)
                | PublishError::FillFailed { .. }
        )
    }
}
