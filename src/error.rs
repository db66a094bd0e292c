use crate::core::classifier::ClassifiedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrionError {
    #[error("API Error: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("API Error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Response blocked by safety filters: {0}")]
    Blocked(String),

    #[error("No text content returned")]
    EmptyResponse,

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("An optimization is already in progress")]
    Busy,

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error(transparent)]
    Classified(#[from] ClassifiedError),
}
