use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hub API error: {0}")]
    Hub(String),

    #[error("Timed out waiting for execution status: {0}")]
    HubTimeout(String),

    #[error("Unrecognized execution state: {0}")]
    UnknownState(String),

    #[error("Data extraction failed: {0}")]
    Extraction(String),

    #[error("Input file download failed: {0}")]
    Download(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
