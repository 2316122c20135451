//! Job state: the single mutable record the orchestrator owns while a
//! document moves through the pipeline.
//!
//! Stages and progress exist for observability; status transitions drive
//! behavior. The orchestrator in [`crate::process`] is the only writer —
//! extraction, structuring, and export components are pure functions over
//! their inputs and never touch the job.

use crate::error::ErrorRecord;
use crate::export::ExportFormat;
use crate::input::MediaKind;
use crate::table::TableSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Named pipeline step, tracked together with a progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Queued,
    Fetching,
    Preprocessing,
    Extracting,
    Structuring,
    Exporting,
    Uploading,
    Done,
}

impl Stage {
    /// Progress value (0..=100) reported when this stage begins.
    pub fn progress(self) -> u8 {
        match self {
            Stage::Queued => 0,
            Stage::Fetching => 5,
            Stage::Preprocessing => 25,
            Stage::Extracting => 45,
            Stage::Structuring => 70,
            Stage::Exporting => 85,
            Stage::Uploading => 95,
            Stage::Done => 100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Fetching => "fetching",
            Stage::Preprocessing => "preprocessing",
            Stage::Extracting => "extracting",
            Stage::Structuring => "structuring",
            Stage::Exporting => "exporting",
            Stage::Uploading => "uploading",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document's processing record.
///
/// Created externally on upload; owned exclusively by the orchestrator while
/// `Processing`. Terminal once `Completed`, or once the retry budget is
/// spent.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub id: String,
    /// Blob-store key of the uploaded source document.
    pub source_key: String,
    pub media: MediaKind,
    pub stage: Stage,
    pub progress: u8,
    pub status: JobStatus,
    pub retry_count: u32,
    pub error: Option<ErrorRecord>,
    pub result: Option<TableSet>,
    /// format → blob-store path, populated only when the job completes.
    pub artifacts: BTreeMap<ExportFormat, String>,
}

impl ProcessingJob {
    pub fn new(id: impl Into<String>, source_key: impl Into<String>, media: MediaKind) -> Self {
        ProcessingJob {
            id: id.into(),
            source_key: source_key.into(),
            media,
            stage: Stage::Queued,
            progress: 0,
            status: JobStatus::Pending,
            retry_count: 0,
            error: None,
            result: None,
            artifacts: BTreeMap::new(),
        }
    }

    /// Enter `Processing`: clears any prior error and resets to the first
    /// stage.
    pub(crate) fn begin(&mut self) {
        self.status = JobStatus::Processing;
        self.error = None;
        self.advance(Stage::Fetching);
    }

    /// Record entry into `stage`. Progress is monotonically non-decreasing
    /// even if stages are revisited.
    pub(crate) fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        self.progress = self.progress.max(stage.progress());
    }

    pub(crate) fn fail(&mut self, record: ErrorRecord) {
        self.status = JobStatus::Failed;
        self.error = Some(record);
    }

    pub(crate) fn complete(
        &mut self,
        result: TableSet,
        artifacts: BTreeMap<ExportFormat, String>,
    ) {
        self.result = Some(result);
        self.artifacts = artifacts;
        self.status = JobStatus::Completed;
        self.error = None;
        self.advance(Stage::Done);
    }
}
