//! Error handling and custom error types
//!
//! Every failure a generation call can hit is classified here, so callers can
//! decide what to retry and what to show at the node boundary.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote job {job_id} failed: {message}")]
    RemoteJob { job_id: String, message: String },

    #[error("Job {job_id} did not finish within {}s", .elapsed.as_secs_f32())]
    Timeout { job_id: String, elapsed: Duration },

    #[error("Rate limited by GrsAI: {0}")]
    RateLimited(String),

    #[error("HTTP error (status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),
}

impl Error {
    /// Whether the failed call can be repeated safely.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// One-line text shown in a node's status output.
    pub fn status_message(&self) -> String {
        match self {
            Error::Auth(msg) => format!("API key problem: {}", msg),
            Error::Validation(msg) => format!("Invalid request: {}", msg),
            Error::Network(msg) => format!("Network failure: {}", msg),
            Error::RemoteJob { message, .. } => format!("Generation failed remotely: {}", message),
            Error::Timeout { elapsed, .. } => {
                format!("Generation timed out after {}s", elapsed.as_secs())
            }
            Error::RateLimited(_) => "Too many requests, please retry later".to_string(),
            Error::Cancelled => "Cancelled".to_string(),
            other => other.to_string(),
        }
    }

    /// Classifies a transport-level reqwest failure.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Error::Config(format!("Invalid request URL: {}", err))
        } else if err.is_timeout() {
            Error::Network(format!("request timed out: {}", err))
        } else if err.is_connect() {
            Error::Network(format!("connection failed: {}", err))
        } else {
            Error::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
