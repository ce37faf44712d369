use std::time::Duration;
use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid integer for {key}: {value:?}")]
    InvalidInteger { key: &'static str, value: String },

    #[error("Invalid URL for {key}: {value:?} ({reason})")]
    InvalidUrl {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid header value for {key}: {value:?} ({reason})")]
    InvalidHeader {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Login request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Login rejected, landed on {landed_on}")]
    Rejected { landed_on: String },
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Telemetry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Telemetry endpoint returned {status}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Response is not valid JSON: {source}")]
    NotJson {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("Unexpected JSON structure: {reason}")]
    MalformedPayload { reason: String, body: String },

    #[error("No reading found among parameters {parameters:?}")]
    NoReading { parameters: Vec<String> },
}

impl ReadError {
    /// Raw response body, when the request got far enough to have one.
    pub fn body(&self) -> Option<&str> {
        match self {
            ReadError::Status { body, .. }
            | ReadError::NotJson { body, .. }
            | ReadError::MalformedPayload { body, .. } => Some(body),
            ReadError::Transport(_) | ReadError::NoReading { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("No publish acknowledgment within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
}

pub type Result<T> = std::result::Result<T, Error>;
