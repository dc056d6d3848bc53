//! CV rendering: layout to SVG, conversion to PDF.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cv::ExportCvData;

pub mod layout;
pub mod pdf;

pub use pdf::{PdfExportWorker, SvgToPdfConverter};

/// Public URL of a rendered document.
pub type FileUrl = String;

/// Why a render failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderErrorKind {
    /// The CV data is unusable; retrying will not help.
    Input,
    /// The renderer did not finish within its time budget.
    Timeout,
    /// The renderer crashed or produced no document.
    Internal,
}

impl fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderErrorKind::Input => write!(f, "input"),
            RenderErrorKind::Timeout => write!(f, "timeout"),
            RenderErrorKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} render error: {message}")]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub message: String,
}

impl RenderError {
    pub fn input(message: impl Into<String>) -> Self {
        Self {
            kind: RenderErrorKind::Input,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: RenderErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: RenderErrorKind::Internal,
            message: message.into(),
        }
    }
}

/// Turns CV data into a downloadable document.
///
/// Implementations hold no per-call mutable state and may be invoked
/// concurrently. They never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CvRenderer: Send + Sync {
    async fn render(&self, input: &ExportCvData) -> Result<FileUrl, RenderError>;
}
