//! End-to-end pipeline tests over scripted collaborators.
//!
//! Every test drives the real orchestrator with a fake AI backend, a fake
//! OCR engine, and the in-memory blob store. No network, no tesseract, no
//! pdfium: PDFs are exercised only at the validation boundary, everything
//! else goes through PNG inputs generated in memory.

use async_trait::async_trait;
use calamine::{Data, Reader, Xlsx};
use doc2table::{
    BackendError, BlobMeta, BlobStore, EngineKind, ErrorKind, ExportFormat, GenerateRequest,
    GenerativeBackend, JobStatus, MediaKind, MemoryBlobStore, OcrBackend, OcrOptions, Pipeline,
    PipelineConfig, PipelineError, ProcessingJob, Stage, StorageError,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Scripted collaborators ──────────────────────────────────────────────────

/// AI backend that replays a queue of canned outcomes and counts calls.
#[derive(Clone, Default)]
struct ScriptedAi {
    responses: Arc<Mutex<VecDeque<Result<String, BackendError>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedAi {
    fn push_ok(&self, content: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(content.to_string()));
    }

    fn push_err(&self, err: BackendError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedAi {
    async fn generate(&self, _request: &GenerateRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Other("script exhausted".into())))
    }
}

/// OCR engine that returns fixed text and counts calls.
#[derive(Clone)]
struct StaticOcr {
    text: String,
    calls: Arc<AtomicUsize>,
}

impl StaticOcr {
    fn new(text: &str) -> Self {
        StaticOcr {
            text: text.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrBackend for StaticOcr {
    async fn recognize(
        &self,
        _image: &DynamicImage,
        _options: &OcrOptions,
    ) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Store whose reads always fail with an I/O error.
struct BrokenStore;

#[async_trait]
impl BlobStore for BrokenStore {
    async fn put(&self, _key: &str, _bytes: &[u8]) -> Result<String, StorageError> {
        Err(StorageError::Io("disk detached".into()))
    }
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Err(StorageError::Io("disk detached".into()))
    }
    async fn delete(&self, _key: &str) -> Result<bool, StorageError> {
        Err(StorageError::Io("disk detached".into()))
    }
    async fn list(&self, _prefix: &str) -> Result<Vec<BlobMeta>, StorageError> {
        Err(StorageError::Io("disk detached".into()))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

const STATEMENT_JSON: &str = r#"{"tables":[{"name":"transactions","headers":["Date","Description","Amount"],"rows":[["2024-01-05","transfer","1,250.00 ETB"],["2024-01-06","deposit","300"]]}]}"#;

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_fn(64, 48, |x, y| {
        let v = ((x * 3 + y * 5) % 256) as u8;
        Rgb([v, v, v])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn test_config(chain: Vec<EngineKind>) -> PipelineConfig {
    PipelineConfig::builder()
        .engine_chain(chain)
        .storage_backoff_ms(1)
        .ai_timeout_secs(5)
        .fast_preprocess(true)
        .build()
        .unwrap()
}

async fn seeded_store(key: &str) -> MemoryBlobStore {
    let store = MemoryBlobStore::new();
    store.put(key, &png_bytes()).await.unwrap();
    store
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn vision_happy_path_produces_all_artifacts() {
    let ai = ScriptedAi::default();
    ai.push_ok(STATEMENT_JSON);
    let ocr = StaticOcr::new("unused");
    let store = seeded_store("uploads/stmt.png").await;

    let pipeline = Pipeline::new(
        test_config(vec![EngineKind::Vision, EngineKind::LocalOcr]),
        ai.clone(),
        ocr.clone(),
        store,
    );
    let mut job = ProcessingJob::new("j1", "uploads/stmt.png", MediaKind::Image);
    let report = pipeline.process(&mut job).await;

    assert!(report.success, "{}", report.message);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stage, Stage::Done);
    assert_eq!(job.progress, 100);
    assert!(job.error.is_none());

    let tables = job.result.as_ref().unwrap();
    assert_eq!(tables.tables[0].name, "transactions");
    assert_eq!(tables.row_count(), 2);

    assert_eq!(job.artifacts.len(), 3);
    assert_eq!(job.artifacts[&ExportFormat::Spreadsheet], "j1_cleaned.xlsx");
    assert_eq!(job.artifacts[&ExportFormat::Paginated], "j1_output.pdf");
    assert_eq!(job.artifacts[&ExportFormat::Flow], "j1_output.docx");

    // Vision succeeded on the first engine, so OCR never ran.
    assert_eq!(ai.call_count(), 1);
    assert_eq!(ocr.call_count(), 0);
}

#[tokio::test]
async fn completed_job_is_never_reprocessed() {
    let ai = ScriptedAi::default();
    ai.push_ok(STATEMENT_JSON);
    let ocr = StaticOcr::new("unused");
    let store = seeded_store("uploads/stmt.png").await;

    let pipeline = Pipeline::new(
        test_config(vec![EngineKind::Vision]),
        ai.clone(),
        ocr.clone(),
        store,
    );
    let mut job = ProcessingJob::new("j2", "uploads/stmt.png", MediaKind::Image);
    assert!(pipeline.process(&mut job).await.success);
    let calls_after_first = ai.call_count();
    let artifacts = job.artifacts.clone();

    let report = pipeline.process(&mut job).await;
    assert!(report.success);
    assert_eq!(report.message, "Document already processed");
    assert_eq!(ai.call_count(), calls_after_first);
    assert_eq!(ocr.call_count(), 0);
    assert_eq!(job.artifacts, artifacts);
}

#[tokio::test]
async fn vision_failure_falls_back_to_ocr_engine() {
    let ai = ScriptedAi::default();
    // Vision attempts (2) fail softly, then the structuring call succeeds.
    ai.push_err(BackendError::Other("503".into()));
    ai.push_err(BackendError::Other("503".into()));
    ai.push_ok(STATEMENT_JSON);
    let ocr = StaticOcr::new("2024-01-05 transfer 1250\n2024-01-06 deposit 300");
    let store = seeded_store("uploads/stmt.png").await;

    let pipeline = Pipeline::new(
        test_config(vec![EngineKind::Vision, EngineKind::LocalOcr]),
        ai.clone(),
        ocr.clone(),
        store,
    );
    let mut job = ProcessingJob::new("j3", "uploads/stmt.png", MediaKind::Image);
    let report = pipeline.process(&mut job).await;

    assert!(report.success, "{}", report.message);
    assert_eq!(ocr.call_count(), 1);
    assert_eq!(ai.call_count(), 3);
    assert_eq!(job.result.as_ref().unwrap().tables[0].name, "transactions");
}

#[tokio::test]
async fn unusable_ai_output_degrades_to_naive_fallback() {
    let ai = ScriptedAi::default();
    // The structuring call returns prose with no JSON, twice.
    ai.push_ok("I could not find any tables, sorry!");
    ai.push_ok("Still nothing.");
    let ocr = StaticOcr::new("2024-01-05 transfer 1250\n2024-01-06 deposit 300");
    let store = seeded_store("uploads/stmt.png").await;

    let pipeline = Pipeline::new(
        test_config(vec![EngineKind::LocalOcr]),
        ai,
        ocr,
        store,
    );
    let mut job = ProcessingJob::new("j4", "uploads/stmt.png", MediaKind::Image);
    let report = pipeline.process(&mut job).await;

    assert!(report.success, "{}", report.message);
    let table = &job.result.as_ref().unwrap().tables[0];
    // Uniform three-token lines become a col1..col3 grid.
    assert_eq!(table.headers, vec!["col1", "col2", "col3"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0][2], "1250");
}

#[tokio::test]
async fn auth_failure_fails_job_without_engine_fallback() {
    let ai = ScriptedAi::default();
    ai.push_err(BackendError::Auth("401 invalid key".into()));
    let ocr = StaticOcr::new("text that would have worked");
    let store = seeded_store("uploads/stmt.png").await;

    let pipeline = Pipeline::new(
        test_config(vec![EngineKind::Vision, EngineKind::LocalOcr]),
        ai,
        ocr.clone(),
        store,
    );
    let mut job = ProcessingJob::new("j5", "uploads/stmt.png", MediaKind::Image);
    let report = pipeline.process(&mut job).await;

    assert!(!report.success);
    assert_eq!(job.status, JobStatus::Failed);
    let record = job.error.as_ref().unwrap();
    assert_eq!(record.kind, ErrorKind::Structuring);
    assert!(!record.retryable);
    assert!(!report.retry_allowed);
    // Bad credentials poison every AI engine; the chain stops immediately.
    assert_eq!(ocr.call_count(), 0);
    // The generic message leaks no provider detail.
    assert!(!record.message.contains("401"));
}

#[tokio::test]
async fn blank_ocr_surfaces_extraction_error() {
    let ai = ScriptedAi::default();
    let ocr = StaticOcr::new("   \n  ");
    let store = seeded_store("uploads/blank.png").await;

    let pipeline = Pipeline::new(test_config(vec![EngineKind::LocalOcr]), ai, ocr, store);
    let mut job = ProcessingJob::new("j6", "uploads/blank.png", MediaKind::Image);
    let report = pipeline.process(&mut job).await;

    assert!(!report.success);
    let record = job.error.as_ref().unwrap();
    assert_eq!(record.kind, ErrorKind::Extraction);
    assert_eq!(record.stage, Stage::Extracting);
    assert!(record.retryable);
    assert!(report.retry_allowed);
}

#[tokio::test]
async fn missing_source_is_input_validation_not_storage() {
    let ai = ScriptedAi::default();
    let ocr = StaticOcr::new("unused");
    let store = MemoryBlobStore::new();

    let pipeline = Pipeline::new(test_config(vec![EngineKind::LocalOcr]), ai, ocr, store);
    let mut job = ProcessingJob::new("j7", "uploads/nope.png", MediaKind::Image);
    let report = pipeline.process(&mut job).await;

    assert!(!report.success);
    let record = job.error.as_ref().unwrap();
    assert_eq!(record.kind, ErrorKind::InputValidation);
    assert!(!record.retryable);
    assert!(!report.retry_allowed);
}

#[tokio::test]
async fn storage_io_failure_is_retryable_storage_error() {
    let ai = ScriptedAi::default();
    let ocr = StaticOcr::new("unused");

    let pipeline = Pipeline::new(
        test_config(vec![EngineKind::LocalOcr]),
        ai,
        ocr,
        BrokenStore,
    );
    let mut job = ProcessingJob::new("j8", "uploads/stmt.png", MediaKind::Image);
    let report = pipeline.process(&mut job).await;

    assert!(!report.success);
    let record = job.error.as_ref().unwrap();
    assert_eq!(record.kind, ErrorKind::Storage);
    assert_eq!(record.stage, Stage::Fetching);
    assert!(record.retryable);
    assert_eq!(record.message, "File transfer failed");
}

#[tokio::test]
async fn retry_budget_is_spent_only_by_explicit_requests() {
    let ai = ScriptedAi::default();
    let ocr = StaticOcr::new("   "); // always fails extraction
    let store = seeded_store("uploads/stmt.png").await;

    let pipeline = Pipeline::new(
        test_config(vec![EngineKind::LocalOcr]),
        ai,
        ocr,
        store,
    );
    let mut job = ProcessingJob::new("j9", "uploads/stmt.png", MediaKind::Image);

    assert!(!pipeline.process(&mut job).await.success);
    assert_eq!(job.retry_count, 0, "a failed run must not consume the budget");

    for expected in 1..=3u32 {
        pipeline.request_retry(&mut job).unwrap();
        assert_eq!(job.retry_count, expected);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error.is_none());
        assert!(!pipeline.process(&mut job).await.success);
    }

    // Fourth request exceeds the ceiling and leaves the job untouched.
    let err = pipeline.request_retry(&mut job).unwrap_err();
    assert!(matches!(err, PipelineError::MaxRetriesExceeded));
    assert_eq!(job.retry_count, 3);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
}

#[tokio::test]
async fn retry_request_rejected_unless_failed() {
    let ai = ScriptedAi::default();
    ai.push_ok(STATEMENT_JSON);
    let ocr = StaticOcr::new("unused");
    let store = seeded_store("uploads/stmt.png").await;

    let pipeline = Pipeline::new(test_config(vec![EngineKind::Vision]), ai, ocr, store);
    let mut job = ProcessingJob::new("j10", "uploads/stmt.png", MediaKind::Image);

    // Pending job: nothing to retry yet.
    assert!(pipeline.request_retry(&mut job).is_err());

    assert!(pipeline.process(&mut job).await.success);
    // Completed job: retrying makes no sense either.
    assert!(pipeline.request_retry(&mut job).is_err());
    assert_eq!(job.retry_count, 0);
}

#[tokio::test]
async fn retry_request_rejected_for_non_retryable_failure() {
    let ai = ScriptedAi::default();
    let ocr = StaticOcr::new("unused");
    let store = MemoryBlobStore::new();

    let pipeline = Pipeline::new(test_config(vec![EngineKind::LocalOcr]), ai, ocr, store);
    let mut job = ProcessingJob::new("j13", "uploads/nope.png", MediaKind::Image);

    // Missing source fails validation, which the report marks unretryable.
    let report = pipeline.process(&mut job).await;
    assert!(!report.success);
    assert!(!report.retry_allowed);

    let err = pipeline.request_retry(&mut job).unwrap_err();
    assert!(matches!(err, PipelineError::InputValidation { .. }));
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
}

#[tokio::test]
async fn spreadsheet_artifact_round_trips_through_calamine() {
    let ai = ScriptedAi::default();
    ai.push_ok(STATEMENT_JSON);
    let ocr = StaticOcr::new("unused");
    let store = Arc::new(seeded_store("uploads/stmt.png").await);

    let pipeline = Pipeline::new(
        test_config(vec![EngineKind::Vision]),
        ai,
        ocr,
        ArcStore(store.clone()),
    );
    let mut job = ProcessingJob::new("j11", "uploads/stmt.png", MediaKind::Image);
    assert!(pipeline.process(&mut job).await.success);

    let bytes = store.get("j11_cleaned.xlsx").await.unwrap().unwrap();
    let mut workbook = Xlsx::new(Cursor::new(bytes)).unwrap();
    let range = workbook.worksheet_range("transactions").unwrap();

    assert_eq!(range.get_value((0, 0)), Some(&Data::String("Date".into())));
    assert_eq!(
        range.get_value((1, 1)),
        Some(&Data::String("transfer".into()))
    );
    // Currency cell re-typed as a real number.
    assert_eq!(range.get_value((1, 2)), Some(&Data::Float(1250.0)));
    assert_eq!(range.get_value((2, 2)), Some(&Data::Float(300.0)));
    // Date cells become typed datetimes, not strings.
    assert!(matches!(range.get_value((1, 0)), Some(Data::DateTime(_))));
}

#[tokio::test]
async fn corrupt_input_bytes_fail_validation() {
    let ai = ScriptedAi::default();
    let ocr = StaticOcr::new("unused");
    let store = MemoryBlobStore::new();
    store.put("uploads/fake.pdf", b"not a pdf at all").await.unwrap();

    let pipeline = Pipeline::new(test_config(vec![EngineKind::LocalOcr]), ai, ocr, store);
    let mut job = ProcessingJob::new("j12", "uploads/fake.pdf", MediaKind::Pdf);
    let report = pipeline.process(&mut job).await;

    assert!(!report.success);
    assert_eq!(job.error.as_ref().unwrap().kind, ErrorKind::InputValidation);
    assert_eq!(job.error.as_ref().unwrap().stage, Stage::Preprocessing);
}

/// Adapter so a test can keep a handle to the store the pipeline consumed.
struct ArcStore(Arc<MemoryBlobStore>);

#[async_trait]
impl BlobStore for ArcStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        self.0.put(key, bytes).await
    }
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.0.get(key).await
    }
    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.0.delete(key).await
    }
    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, StorageError> {
        self.0.list(prefix).await
    }
}
