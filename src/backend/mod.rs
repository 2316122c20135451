//! Collaborator seams: generative AI, local OCR, and blob storage.
//!
//! Each trait is deliberately narrow — one request-shaped method — so the
//! orchestrator can be driven by scripted fakes in tests and so swapping a
//! provider never touches pipeline code. Production implementations live in
//! the submodules; tests supply their own.

use async_trait::async_trait;
use image::DynamicImage;
use thiserror::Error;

mod llm;
mod ocr;
mod storage;

pub use llm::EdgequakeBackend;
pub use ocr::TesseractBackend;
pub use storage::{FsBlobStore, MemoryBlobStore};

// ── Generative backend ─────────────────────────────────────────────────────

/// One base64-encoded image attached to a generation request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base64 payload without a data-URI prefix.
    pub data: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
}

/// A single prompt-plus-attachments request to the generative backend.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub images: Vec<EncodedImage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Failure classes a backend reports. The pipeline maps these onto its own
/// retry policy; backends only classify, never decide.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Credentials rejected. Retrying cannot help.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Rate limit or quota exhausted.
    #[error("quota exhausted: {0}")]
    Quota(String),

    /// The provider refused to answer (safety filter, empty candidate).
    #[error("response blocked: {0}")]
    Blocked(String),

    /// Anything else: transport failure, 5xx, malformed provider payload.
    #[error("backend failure: {0}")]
    Other(String),
}

/// A text-or-vision generative model behind a single completion call.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Run one completion. Implementations perform no internal retries; the
    /// caller owns the attempt/deadline policy.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, BackendError>;
}

// ── OCR backend ─────────────────────────────────────────────────────────────

/// Engine options passed through to the local OCR engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    /// Engine mode (`--oem`). Default 3: whatever the engine considers best.
    pub engine_mode: u32,
    /// Page segmentation mode (`--psm`). Default 6: a uniform block of text,
    /// the right assumption for statement tables.
    pub segmentation_mode: u32,
    /// Language pack list, `+`-joined. Default `eng+amh`.
    pub languages: String,
}

impl Default for OcrOptions {
    fn default() -> Self {
        OcrOptions {
            engine_mode: 3,
            segmentation_mode: 6,
            languages: "eng+amh".to_string(),
        }
    }
}

/// A local text-recognition engine.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Recognize text in one preprocessed page image.
    async fn recognize(
        &self,
        image: &DynamicImage,
        options: &OcrOptions,
    ) -> Result<String, BackendError>;
}

// ── Blob storage ────────────────────────────────────────────────────────────

/// Metadata for one stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    pub size_bytes: u64,
}

/// Storage-layer failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Content-addressed-ish blob storage keyed by caller-supplied strings.
///
/// `put` returns the stored path (which may differ from the key for stores
/// that prefix or shard), and overwrites silently.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// `Ok(None)` when the key does not exist; `Err` only for real I/O
    /// failures. Absence is a domain outcome, not an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, StorageError>;
}
