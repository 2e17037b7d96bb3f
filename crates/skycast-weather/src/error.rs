//! Error classification for the acquisition pipeline.
//!
//! Every failure that leaves the pipeline is a [`ClassifiedError`] of one of
//! five kinds. Raw transport, status and decode failures are wrapped in
//! [`Failure`] and mapped by [`classify`].

use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flat failure taxonomy exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    #[serde(rename = "http_4xx")]
    Http4xx,
    #[serde(rename = "http_5xx")]
    Http5xx,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Http4xx => "http_4xx",
            Self::Http5xx => "http_5xx",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds retried by default: transient transport and server failures.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Http5xx)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure normalized to one of the [`ErrorKind`]s. Immutable once built.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    #[source]
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            cause: None,
        }
    }

    pub fn timeout(after_ms: u128) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Request timed out after {}ms", after_ms),
        )
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Kind-specific message suitable for display in the UI.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Network => {
                "Unable to connect to the weather service. Check your network and try again."
            }
            ErrorKind::Timeout => "The weather service took too long to respond. Please try again.",
            ErrorKind::Http4xx => "The weather request was rejected. Try another location.",
            ErrorKind::Http5xx => {
                "The weather service is experiencing issues. Please try again in a few moments."
            }
            ErrorKind::Unknown => "Something went wrong while loading the weather.",
        }
    }
}

/// A raw failure produced by an operation before classification.
#[derive(Debug, Error)]
pub enum Failure {
    /// Already carries a recognized kind (e.g. raised internally as a timeout).
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Response parsed but lacked the requested data section.
    #[error("Missing {0} data in response")]
    MissingSection(&'static str),

    #[error("{0}")]
    Other(String),
}

/// Map a raw failure to a [`ClassifiedError`]. Pure function of its input.
pub fn classify(failure: impl Into<Failure>) -> ClassifiedError {
    match failure.into() {
        Failure::Classified(e) => e,
        Failure::Transport(e) => classify_transport(e),
        Failure::Status { status, body } => classify_status(status, body),
        Failure::Io(e) => {
            if is_connectivity_fault(&e) {
                ClassifiedError::new(ErrorKind::Network, e.to_string()).with_cause(e)
            } else {
                ClassifiedError::new(ErrorKind::Unknown, e.to_string()).with_cause(e)
            }
        }
        Failure::Decode(e) => ClassifiedError::new(
            ErrorKind::Unknown,
            format!("Failed to decode response: {}", e),
        )
        .with_cause(e),
        failure @ Failure::MissingSection(_) => {
            ClassifiedError::new(ErrorKind::Unknown, failure.to_string())
        }
        Failure::Other(message) => ClassifiedError::new(ErrorKind::Unknown, message),
    }
}

fn classify_transport(error: reqwest::Error) -> ClassifiedError {
    if error.is_timeout() {
        return ClassifiedError::new(ErrorKind::Timeout, error.to_string()).with_cause(error);
    }

    if let Some(status) = error.status() {
        let classified = classify_status(status.as_u16(), error.to_string());
        return classified.with_cause(error);
    }

    // Connection refused/reset, DNS failures and request send failures
    if error.is_connect() || error.is_request() {
        return ClassifiedError::new(ErrorKind::Network, error.to_string()).with_cause(error);
    }

    ClassifiedError::new(ErrorKind::Unknown, error.to_string()).with_cause(error)
}

fn classify_status(status: u16, body: String) -> ClassifiedError {
    let classified = if status >= 500 {
        ClassifiedError::new(ErrorKind::Http5xx, format!("Server error ({})", status))
    } else if status >= 400 {
        ClassifiedError::new(ErrorKind::Http4xx, format!("Client error ({})", status))
    } else {
        ClassifiedError::new(
            ErrorKind::Unknown,
            if body.is_empty() {
                format!("Unexpected status ({})", status)
            } else {
                body
            },
        )
    };
    classified.with_status(status)
}

fn is_connectivity_fault(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}
