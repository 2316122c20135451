//! # doc2table
//!
//! Extract structured tables from scanned documents — bank statements, forms,
//! mixed-script handwriting — and export them as spreadsheet, PDF, and DOCX
//! artifacts.
//!
//! ## Why this crate?
//!
//! Scans of semi-structured documents defeat plain OCR: column boundaries are
//! visual, not textual, and handwriting or mixed scripts (Latin + Ethiopic)
//! produce noisy text that no regex can reliably tabulate. This crate pairs a
//! degradation-tolerant extraction front end (local OCR or a multimodal
//! vision model) with an AI structuring step bound to a strict JSON contract,
//! and a deterministic line/whitespace fallback so the pipeline always
//! produces *some* valid table model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes (image | PDF)
//!  │
//!  ├─ 1. Preprocess  grayscale, upscale, contrast; PDF pages via pdfium
//!  ├─ 2. Extract     Local-OCR (text) or Vision (tables), ordered fallback
//!  ├─ 3. Structure   LLM → {tables:[{name,headers,rows}]}, naive fallback
//!  ├─ 4. Export      XLSX / PDF / DOCX encoders over the canonical TableSet
//!  └─ 5. Upload      artifacts persisted through the BlobStore collaborator
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2table::{
//!     EdgequakeBackend, FsBlobStore, MediaKind, Pipeline, PipelineConfig,
//!     ProcessingJob, TesseractBackend,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let store = FsBlobStore::new("out");
//!     let ai = EdgequakeBackend::from_env(None)?;
//!     let ocr = TesseractBackend::default();
//!
//!     let pipeline = Pipeline::new(config, ai, ocr, store);
//!     let mut job = ProcessingJob::new("stmt-42", "uploads/stmt-42.png", MediaKind::Image);
//!     let report = pipeline.process(&mut job).await;
//!     println!("{}: {:?}", report.message, job.artifacts);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2table` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod input;
pub mod job;
pub mod pipeline;
pub mod process;
pub mod prompts;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    BackendError, BlobMeta, BlobStore, EdgequakeBackend, EncodedImage, FsBlobStore,
    GenerateRequest, GenerativeBackend, MemoryBlobStore, OcrBackend, OcrOptions, StorageError,
    TesseractBackend,
};
pub use config::{EngineKind, PipelineConfig, PipelineConfigBuilder, PromptContract};
pub use error::{ErrorKind, ErrorRecord, PipelineError};
pub use export::ExportFormat;
pub use input::{MediaKind, PageImage, RawInput};
pub use job::{JobStatus, ProcessingJob, Stage};
pub use process::{Pipeline, ProcessReport};
pub use table::{StructuredTable, TableSet};
