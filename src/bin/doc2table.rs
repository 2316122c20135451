//! CLI binary for doc2table.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one document through the pipeline, and prints the
//! artifact paths.

use anyhow::{bail, Context, Result};
use clap::Parser;
use doc2table::{
    EdgequakeBackend, EngineKind, FsBlobStore, MediaKind, OcrOptions, Pipeline, PipelineConfig,
    ProcessingJob, PromptContract, TesseractBackend,
};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract tables from a scanned statement
  doc2table statement.pdf

  # Photographed handwritten form, OCR only, cleanup contract
  doc2table form.jpg --engines ocr --contract cleanup

  # Specific model, artifacts into ./exports
  doc2table statement.pdf --provider gemini --model gemini-2.0-flash -o exports

  # Print the structured tables as JSON instead of a summary
  doc2table statement.pdf --json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)

LOCAL OCR:
  The ocr engine requires a `tesseract` binary on PATH with the language
  packs named by --langs (default eng+amh) installed.
"#;

/// Extract structured tables from scanned statements and forms.
#[derive(Parser, Debug)]
#[command(
    name = "doc2table",
    version,
    about = "Extract structured tables from scanned bank statements and forms",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input document: a PDF, PNG, or JPEG file.
    input: PathBuf,

    /// Directory artifacts are written into.
    #[arg(short, long, env = "DOC2TABLE_OUTPUT", default_value = "out")]
    output: PathBuf,

    /// Extraction engine chain: vision, ocr, vision+ocr, or ocr+vision.
    #[arg(long, env = "DOC2TABLE_ENGINES", default_value = "vision+ocr")]
    engines: String,

    /// Prompt contract: verbatim (preserve every character) or cleanup
    /// (confident corrections and normalization).
    #[arg(long, env = "DOC2TABLE_CONTRACT", value_enum, default_value = "verbatim")]
    contract: ContractArg,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rasterisation DPI for PDF pages (72-400).
    #[arg(long, env = "DOC2TABLE_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Maximum PDF pages to process.
    #[arg(long, env = "DOC2TABLE_PAGE_CAP", default_value_t = 4)]
    page_cap: usize,

    /// OCR language packs, +-joined.
    #[arg(long, env = "DOC2TABLE_LANGS", default_value = "eng+amh")]
    langs: String,

    /// Skip the denoise pass for faster preprocessing.
    #[arg(long, env = "DOC2TABLE_FAST")]
    fast: bool,

    /// Per-call AI deadline in seconds.
    #[arg(long, env = "DOC2TABLE_AI_TIMEOUT", default_value_t = 90)]
    ai_timeout: u64,

    /// Print the structured tables as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2TABLE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2TABLE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ContractArg {
    Verbatim,
    Cleanup,
}

impl From<ContractArg> for PromptContract {
    fn from(v: ContractArg) -> Self {
        match v {
            ContractArg::Verbatim => PromptContract::Verbatim,
            ContractArg::Cleanup => PromptContract::Cleanup,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Input ────────────────────────────────────────────────────────────
    let extension = cli
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let media = MediaKind::from_extension(extension)
        .with_context(|| format!("unsupported input type: {:?}", cli.input))?;
    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("failed to read {:?}", cli.input))?;

    // ── Config and collaborators ─────────────────────────────────────────
    let config = PipelineConfig::builder()
        .dpi(cli.dpi)
        .page_cap(cli.page_cap)
        .fast_preprocess(cli.fast)
        .ai_timeout_secs(cli.ai_timeout)
        .engine_chain(parse_engines(&cli.engines)?)
        .prompt_contract(cli.contract.clone().into())
        .ocr(OcrOptions {
            languages: cli.langs.clone(),
            ..OcrOptions::default()
        })
        .build()
        .context("invalid configuration")?;

    let ai = match (&cli.provider, &cli.model) {
        (Some(provider), Some(model)) => EdgequakeBackend::from_provider_name(provider, model),
        _ => EdgequakeBackend::from_env(cli.model.as_deref()),
    }
    .context("no AI provider available")?;

    let store = FsBlobStore::new(&cli.output);
    let pipeline = Pipeline::new(config, ai, TesseractBackend::default(), store.clone());

    // ── Run ──────────────────────────────────────────────────────────────
    let job_id = uuid::Uuid::new_v4().to_string();
    let source_key = format!("{job_id}_source.{extension}");
    upload_source(&store, &source_key, &bytes).await?;

    let mut job = ProcessingJob::new(job_id, source_key, media);
    let report = pipeline.process(&mut job).await;

    if !report.success {
        bail!("{}", report.message);
    }

    if cli.json {
        let tables = job
            .result
            .as_ref()
            .context("completed job carries no result")?;
        println!("{}", serde_json::to_string_pretty(tables)?);
    } else if !cli.quiet {
        let rows = job.result.as_ref().map(|t| t.row_count()).unwrap_or(0);
        eprintln!("{} ({rows} rows extracted)", report.message);
        for (format, path) in &job.artifacts {
            eprintln!("  {:<12} {path}", format!("{format:?}"));
        }
    }

    Ok(())
}

async fn upload_source(store: &FsBlobStore, key: &str, bytes: &[u8]) -> Result<()> {
    use doc2table::BlobStore as _;
    store
        .put(key, bytes)
        .await
        .context("failed to stage the source document")?;
    Ok(())
}

/// Parse `--engines` into an ordered chain.
fn parse_engines(s: &str) -> Result<Vec<EngineKind>> {
    let mut chain = Vec::new();
    for part in s.split(['+', ',']) {
        match part.trim().to_ascii_lowercase().as_str() {
            "vision" => chain.push(EngineKind::Vision),
            "ocr" => chain.push(EngineKind::LocalOcr),
            other => bail!("unknown engine {other:?} (expected vision or ocr)"),
        }
    }
    if chain.is_empty() {
        bail!("engine chain is empty");
    }
    Ok(chain)
}
