//! Error types for the doc2table pipeline.
//!
//! Two layers reflect two audiences:
//!
//! * [`PipelineError`] — the typed failure a stage returns to the
//!   orchestrator. Carries enough detail for logs and classification.
//!
//! * [`ErrorRecord`] — what gets persisted on the job and shown to users:
//!   a stable [`ErrorKind`], a short generic message (never provider
//!   exception text), the stage that failed, and whether a retry is allowed.
//!
//! Stages never raise past their boundary; the orchestrator in
//! [`crate::process`] is the single place that converts a `PipelineError`
//! into a persisted `ErrorRecord`.

use crate::job::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All failures a pipeline stage can return.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input bytes are unusable: empty, wrong media type, corrupt PDF.
    #[error("invalid input: {reason}")]
    InputValidation { reason: String },

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// A blob-store read or write failed after its retry budget.
    #[error("storage operation failed: {detail}")]
    Storage { detail: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The OCR engine produced no usable text for any page.
    ///
    /// Surfaced as retryable so the caller may route the job through an
    /// alternate extraction engine.
    #[error("no readable text found in document")]
    NoReadableText,

    /// An extraction engine failed outright (backend crash, unusable
    /// vision response).
    #[error("extraction failed: {detail}")]
    Extraction { detail: String },

    // ── Structuring errors ────────────────────────────────────────────────
    /// The AI call exceeded its deadline on every attempt.
    #[error("AI call timed out after {secs}s")]
    AiTimeout { secs: u64 },

    /// The AI backend reported quota/rate-limit exhaustion.
    #[error("AI quota exhausted: {detail}")]
    AiQuota { detail: String },

    /// The AI backend rejected our credentials — retrying will not help.
    #[error("AI authentication failed: {detail}")]
    AiAuth { detail: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// An artifact encoder failed on the table model.
    #[error("artifact generation failed: {detail}")]
    Generation { detail: String },

    // ── Retry ceiling ─────────────────────────────────────────────────────
    /// The job has consumed its retry budget.
    #[error("maximum retry attempts reached")]
    MaxRetriesExceeded,
}

impl PipelineError {
    /// Stable classification of this error for records and user responses.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InputValidation { .. } | PipelineError::InvalidConfig(_) => {
                ErrorKind::InputValidation
            }
            PipelineError::Storage { .. } => ErrorKind::Storage,
            PipelineError::NoReadableText | PipelineError::Extraction { .. } => {
                ErrorKind::Extraction
            }
            PipelineError::AiTimeout { .. }
            | PipelineError::AiQuota { .. }
            | PipelineError::AiAuth { .. } => ErrorKind::Structuring,
            PipelineError::Generation { .. } => ErrorKind::Generation,
            PipelineError::MaxRetriesExceeded => ErrorKind::MaxRetriesExceeded,
        }
    }

    /// Whether an explicit retry request is allowed to follow this failure.
    pub fn retryable(&self) -> bool {
        match self {
            PipelineError::InputValidation { .. } | PipelineError::InvalidConfig(_) => false,
            PipelineError::Storage { .. } => true,
            PipelineError::NoReadableText | PipelineError::Extraction { .. } => true,
            PipelineError::AiTimeout { .. } | PipelineError::AiQuota { .. } => true,
            PipelineError::AiAuth { .. } => false,
            PipelineError::Generation { .. } => true,
            PipelineError::MaxRetriesExceeded => false,
        }
    }
}

/// Coarse error classification persisted on the job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InputValidation,
    Storage,
    Extraction,
    Structuring,
    Generation,
    MaxRetriesExceeded,
}

impl ErrorKind {
    /// Short, generic user-facing message. Provider exception text never
    /// reaches the user; the typed error stays in the logs.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::InputValidation => "Invalid input file",
            ErrorKind::Storage => "File transfer failed",
            ErrorKind::Extraction => "Text extraction failed",
            ErrorKind::Structuring => "Document structuring failed",
            ErrorKind::Generation => "Output generation failed",
            ErrorKind::MaxRetriesExceeded => "Maximum retry attempts reached",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::Storage => "storage_error",
            ErrorKind::Extraction => "extraction_error",
            ErrorKind::Structuring => "structuring_error",
            ErrorKind::Generation => "generation_error",
            ErrorKind::MaxRetriesExceeded => "max_retries_exceeded",
        };
        f.write_str(s)
    }
}

/// The failure snapshot persisted on a [`crate::job::ProcessingJob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub stage: Stage,
    pub retryable: bool,
}

impl ErrorRecord {
    /// Build the persisted record for a stage failure.
    pub fn from_error(err: &PipelineError, stage: Stage) -> Self {
        let kind = err.kind();
        ErrorRecord {
            kind,
            message: kind.user_message().to_string(),
            stage,
            retryable: err.retryable(),
        }
    }
}
