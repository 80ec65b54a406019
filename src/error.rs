//! Error types for the L3 estimator

use thiserror::Error;

/// Errors surfaced by the estimator and its adapters
#[derive(Error, Debug)]
pub enum L3BookError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("failed to parse decimal `{0}`")]
    Parse(String),

    #[error("invalid cluster count {0}, expected 1..=20")]
    Configuration(usize),

    #[error("precision unavailable for symbol {0}")]
    PrecisionUnavailable(String),

    #[error("REST API error: {0}")]
    RestApi(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("connection timeout")]
    ConnectionTimeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for L3BookError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        L3BookError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for L3BookError {
    fn from(err: serde_json::Error) -> Self {
        L3BookError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for L3BookError {
    fn from(err: reqwest::Error) -> Self {
        L3BookError::RestApi(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, L3BookError>;
