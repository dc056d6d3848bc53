//! Error taxonomy shared by the routes and the clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every terminal export failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The request payload is invalid.
    Input,
    /// No response was obtained from the service.
    Network,
    /// The renderer crashed or timed out, or the service failed internally.
    Internal,
    /// The job expired or never existed.
    NotFound,
    /// Polling used up its budget without reaching a terminal status.
    TimedOut,
}

impl ErrorKind {
    /// Whether offering the user a retry makes sense.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::TimedOut)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Input => "input",
            ErrorKind::Network => "network",
            ErrorKind::Internal => "internal",
            ErrorKind::NotFound => "notFound",
            ErrorKind::TimedOut => "timedOut",
        };
        f.write_str(s)
    }
}

/// A classified export failure as surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExportError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
