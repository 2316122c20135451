//! Artifact encoders: one [`TableSet`] in, format-specific bytes out.
//!
//! Every encoder is a pure function over the table model. None of them
//! re-validate tables (construction already repaired them) and none touch
//! storage — the orchestrator uploads whatever bytes come back.
//!
//! Only the spreadsheet encoder re-types cells (via [`coerce`]) so sorting
//! and summing work; the page and flow encoders render cell text verbatim.

use crate::error::PipelineError;
use crate::table::TableSet;
use serde::{Deserialize, Serialize};

pub mod coerce;
mod flow;
mod paginated;
mod spreadsheet;

pub use coerce::CellValue;

/// Output artifact format.
///
/// `Ord` so artifact maps iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExportFormat {
    /// Workbook with one sheet per table and typed cells.
    Spreadsheet,
    /// Fixed-layout page document.
    Paginated,
    /// Reflowable word-processor document.
    Flow,
}

impl ExportFormat {
    /// Every format, in the order artifacts are generated.
    pub const ALL: [ExportFormat; 3] = [
        ExportFormat::Spreadsheet,
        ExportFormat::Paginated,
        ExportFormat::Flow,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Spreadsheet => "xlsx",
            ExportFormat::Paginated => "pdf",
            ExportFormat::Flow => "docx",
        }
    }

    /// Artifact key for a job: the spreadsheet is the cleaned primary output,
    /// the page/flow documents are presentation renderings.
    pub fn artifact_key(self, job_id: &str) -> String {
        match self {
            ExportFormat::Spreadsheet => format!("{job_id}_cleaned.xlsx"),
            ExportFormat::Paginated => format!("{job_id}_output.pdf"),
            ExportFormat::Flow => format!("{job_id}_output.docx"),
        }
    }

    /// Encode the table set into this format's bytes.
    pub fn encode(self, tables: &TableSet) -> Result<Vec<u8>, PipelineError> {
        match self {
            ExportFormat::Spreadsheet => spreadsheet::encode(tables),
            ExportFormat::Paginated => paginated::encode(tables),
            ExportFormat::Flow => flow::encode(tables),
        }
    }
}
