//! The orchestrator: sequences fetch, preprocess, extract, structure,
//! export, and upload for one job, and owns every job-state transition.
//!
//! ## State machine rules
//!
//! * `process` on a `Completed` job returns immediately without touching any
//!   collaborator — reprocessing a finished job must be a no-op.
//! * A stage failure is converted into exactly one persisted
//!   [`ErrorRecord`]; stages themselves never write job state.
//! * `retry_count` moves only through [`Pipeline::request_retry`], never as a
//!   side effect of a failed run. Transient recoveries inside a run (storage
//!   re-reads, AI re-attempts, engine fallback) do not consume the budget.

use crate::backend::{BlobStore, GenerativeBackend, OcrBackend};
use crate::config::PipelineConfig;
use crate::error::{ErrorRecord, PipelineError};
use crate::export::ExportFormat;
use crate::input::RawInput;
use crate::job::{JobStatus, ProcessingJob, Stage};
use crate::pipeline::extract::{run_engine, Extraction};
use crate::pipeline::{preprocess, structure};
use crate::table::TableSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome summary returned to the caller after one processing run.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub success: bool,
    /// Short user-facing message; provider detail stays in the logs.
    pub message: String,
    /// Whether an explicit retry request would be accepted.
    pub retry_allowed: bool,
    pub error: Option<ErrorRecord>,
}

/// The document pipeline. Construct once, process many jobs.
pub struct Pipeline {
    config: PipelineConfig,
    ai: Arc<dyn GenerativeBackend>,
    ocr: Arc<dyn OcrBackend>,
    store: Arc<dyn BlobStore>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        ai: impl GenerativeBackend + 'static,
        ocr: impl OcrBackend + 'static,
        store: impl BlobStore + 'static,
    ) -> Self {
        Pipeline {
            config,
            ai: Arc::new(ai),
            ocr: Arc::new(ocr),
            store: Arc::new(store),
        }
    }

    /// Run the full pipeline for one job.
    pub async fn process(&self, job: &mut ProcessingJob) -> ProcessReport {
        if job.status == JobStatus::Completed {
            return ProcessReport {
                success: true,
                message: "Document already processed".to_string(),
                retry_allowed: false,
                error: None,
            };
        }

        job.begin();
        info!(job = %job.id, source = %job.source_key, "processing started");

        match self.run_stages(job).await {
            Ok((tables, artifacts)) => {
                let rows = tables.row_count();
                job.complete(tables, artifacts);
                info!(job = %job.id, rows, "processing completed");
                ProcessReport {
                    success: true,
                    message: "Document processed successfully".to_string(),
                    retry_allowed: false,
                    error: None,
                }
            }
            Err(err) => {
                let record = ErrorRecord::from_error(&err, job.stage);
                warn!(job = %job.id, stage = %job.stage, "processing failed: {err}");
                let retry_allowed = record.retryable && job.retry_count < self.config.max_retries;
                let message = record.message.clone();
                job.fail(record.clone());
                ProcessReport {
                    success: false,
                    message,
                    retry_allowed,
                    error: Some(record),
                }
            }
        }
    }

    /// Accept or reject an explicit retry request for a failed job.
    ///
    /// Only failures recorded as retryable are eligible: a job that failed on
    /// bad input or bad credentials stays failed, under the ceiling or not.
    /// On acceptance the job returns to `Pending` with its error cleared and
    /// the retry counter incremented; the caller then invokes
    /// [`Pipeline::process`] again. Rejection leaves the job untouched.
    pub fn request_retry(&self, job: &mut ProcessingJob) -> Result<(), PipelineError> {
        if job.status != JobStatus::Failed {
            return Err(PipelineError::InputValidation {
                reason: format!("job {} is not in a failed state", job.id),
            });
        }
        if job.retry_count >= self.config.max_retries {
            return Err(PipelineError::MaxRetriesExceeded);
        }
        // Failures reported with retry_allowed:false stay final.
        if matches!(&job.error, Some(record) if !record.retryable) {
            return Err(PipelineError::InputValidation {
                reason: format!("job {} failed with a non-retryable error", job.id),
            });
        }
        job.retry_count += 1;
        job.status = JobStatus::Pending;
        job.error = None;
        info!(job = %job.id, retry = job.retry_count, "retry accepted");
        Ok(())
    }

    async fn run_stages(
        &self,
        job: &mut ProcessingJob,
    ) -> Result<(TableSet, BTreeMap<ExportFormat, String>), PipelineError> {
        // Fetch
        job.advance(Stage::Fetching);
        let bytes = self.fetch_with_retry(&job.source_key).await?;
        let input = RawInput::new(bytes, job.media);

        // Preprocess
        job.advance(Stage::Preprocessing);
        let pages = preprocess::prepare_pages(&input, &self.config).await?;

        // Extract, walking the engine chain
        job.advance(Stage::Extracting);
        let extraction = self.extract_with_chain(&pages).await?;

        // Structure (vision output arrives structured already)
        let tables = match extraction {
            Extraction::Tables(tables) => tables,
            Extraction::Text(text) => {
                job.advance(Stage::Structuring);
                structure::structure_text(&text, self.ai.as_ref(), &self.config).await?
            }
        };

        // Export
        job.advance(Stage::Exporting);
        let mut encoded: Vec<(ExportFormat, String, Vec<u8>)> = Vec::new();
        for format in ExportFormat::ALL {
            let bytes = format.encode(&tables)?;
            encoded.push((format, format.artifact_key(&job.id), bytes));
        }

        // Upload
        job.advance(Stage::Uploading);
        let mut artifacts = BTreeMap::new();
        for (format, key, bytes) in encoded {
            let path = self.put_with_retry(&key, &bytes).await?;
            artifacts.insert(format, path);
        }

        Ok((tables, artifacts))
    }

    /// Read the source blob under the storage retry policy. A missing key is
    /// an input problem, not a transient storage fault, and is not retried.
    async fn fetch_with_retry(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        let mut last: Option<String> = None;
        for attempt in 1..=self.config.storage_attempts {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(self.config.storage_backoff_ms)).await;
            }
            match self.store.get(key).await {
                Ok(Some(bytes)) if !bytes.is_empty() => return Ok(bytes),
                Ok(Some(_)) => {
                    return Err(PipelineError::InputValidation {
                        reason: format!("source blob {key} is empty"),
                    });
                }
                Ok(None) => {
                    return Err(PipelineError::InputValidation {
                        reason: format!("source blob {key} does not exist"),
                    });
                }
                Err(e) => {
                    warn!(attempt, key, "storage read failed: {e}");
                    last = Some(e.to_string());
                }
            }
        }
        Err(PipelineError::Storage {
            detail: last.unwrap_or_else(|| "storage read failed".to_string()),
        })
    }

    /// Write one artifact under the storage retry policy.
    async fn put_with_retry(&self, key: &str, bytes: &[u8]) -> Result<String, PipelineError> {
        let mut last: Option<String> = None;
        for attempt in 1..=self.config.storage_attempts {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(self.config.storage_backoff_ms)).await;
            }
            match self.store.put(key, bytes).await {
                Ok(path) => return Ok(path),
                Err(e) => {
                    warn!(attempt, key, "storage write failed: {e}");
                    last = Some(e.to_string());
                }
            }
        }
        Err(PipelineError::Storage {
            detail: last.unwrap_or_else(|| "storage write failed".to_string()),
        })
    }

    /// Try each configured engine in order; return the first success or the
    /// last engine's error.
    async fn extract_with_chain(
        &self,
        pages: &[crate::input::PageImage],
    ) -> Result<Extraction, PipelineError> {
        let mut last: Option<PipelineError> = None;
        for &kind in &self.config.engine_chain {
            match run_engine(kind, pages, self.ai.as_ref(), self.ocr.as_ref(), &self.config).await
            {
                Ok(extraction) => return Ok(extraction),
                // Auth failures poison every AI-backed engine; stop walking.
                Err(err @ PipelineError::AiAuth { .. }) => return Err(err),
                Err(err) => {
                    warn!(engine = ?kind, "extraction engine failed: {err}");
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or(PipelineError::NoReadableText))
    }
}
