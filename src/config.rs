//! Configuration for the extraction-structuring-export pipeline.
//!
//! Every knob lives in one immutable [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`] and passed into component constructors. No
//! component reads ambient process state: the historical behavior of pulling
//! model names, DPI, and timeouts from environment variables at call sites
//! made runs irreproducible, so the environment is consulted only at the
//! edges (CLI / backend construction).
//!
//! # Design choice: builder over constructor
//! A builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest, and keeps clamping/validation in
//! one place.

use crate::backend::OcrOptions;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Extraction engine variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    /// Multimodal model maps page images directly to structured tables.
    Vision,
    /// Local text recognition; output goes through the structuring service.
    LocalOcr,
}

/// Which prompt contract the AI structuring step uses.
///
/// The two contracts are mutually inconsistent policies — a deployment picks
/// one and sticks to it; they are never blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptContract {
    /// Preserve source script and characters exactly; never fix OCR errors,
    /// normalize dates, or change case. (default)
    #[default]
    Verbatim,
    /// Correct high-confidence OCR mistakes and normalize dates/numbers.
    Cleanup,
}

/// Configuration for one pipeline instance.
///
/// # Example
/// ```rust
/// use doc2table::{EngineKind, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .dpi(150)
///     .page_cap(2)
///     .engine_chain(vec![EngineKind::LocalOcr])
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rasterisation DPI for PDF pages. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Maximum number of PDF pages rasterized per document. Default: 4.
    ///
    /// Pages beyond the cap are silently dropped — bank statements carry
    /// their tables up front, and every extra page costs OCR/vision latency.
    pub page_cap: usize,

    /// Cap on either rendered dimension in pixels. Default: 2000.
    ///
    /// Independent of DPI: an A0 poster at 200 DPI would otherwise exhaust
    /// memory.
    pub max_pixels: u32,

    /// Upscale factor applied during image normalization. Default: 1.5.
    ///
    /// Handwriting OCR improves noticeably with a modest upscale; beyond ~2×
    /// the gains vanish while memory use grows quadratically.
    pub scale_factor: f32,

    /// Contrast boost applied during normalization. Default: 18.0.
    pub contrast_boost: f32,

    /// Skip the median-denoise pass for latency-sensitive callers.
    /// Default: false.
    pub fast_preprocess: bool,

    /// Ordered extraction fallback chain. Default: `[Vision, LocalOcr]`.
    ///
    /// The orchestrator tries each engine in order and moves on only when an
    /// engine fails entirely. A single-element chain disables fallback.
    pub engine_chain: Vec<EngineKind>,

    /// Maximum page images sent in one vision request. Default: 4.
    ///
    /// Bounds request size and latency; extra pages are ignored by the
    /// vision engine (the page cap already bounds what exists).
    pub vision_page_cap: usize,

    /// Prompt contract for AI structuring. Default: [`PromptContract::Verbatim`].
    pub prompt_contract: PromptContract,

    /// Sampling temperature for AI calls. Default: 0.15.
    ///
    /// Near-deterministic output is what a transcription task wants.
    pub temperature: f32,

    /// Maximum tokens the AI may generate per call. Default: 4000.
    pub max_tokens: usize,

    /// Hard deadline per AI call in seconds. Default: 90.
    pub ai_timeout_secs: u64,

    /// Total external AI attempts per structuring invocation. Default: 2.
    pub ai_attempts: u32,

    /// Blob-store attempts per read/write. Default: 2.
    pub storage_attempts: u32,

    /// Fixed backoff between storage attempts in milliseconds. Default: 500.
    ///
    /// No exponential backoff or jitter: at two attempts there is no herd to
    /// thunder.
    pub storage_backoff_ms: u64,

    /// Retry-request ceiling per job. Default: 3.
    pub max_retries: u32,

    /// Local OCR engine options (engine mode, segmentation mode, languages).
    pub ocr: OcrOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            dpi: 200,
            page_cap: 4,
            max_pixels: 2000,
            scale_factor: 1.5,
            contrast_boost: 18.0,
            fast_preprocess: false,
            engine_chain: vec![EngineKind::Vision, EngineKind::LocalOcr],
            vision_page_cap: 4,
            prompt_contract: PromptContract::Verbatim,
            temperature: 0.15,
            max_tokens: 4000,
            ai_timeout_secs: 90,
            ai_attempts: 2,
            storage_attempts: 2,
            storage_backoff_ms: 500,
            max_retries: 3,
            ocr: OcrOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn page_cap(mut self, cap: usize) -> Self {
        self.config.page_cap = cap.max(1);
        self
    }

    pub fn max_pixels(mut self, px: u32) -> Self {
        self.config.max_pixels = px.max(100);
        self
    }

    pub fn scale_factor(mut self, factor: f32) -> Self {
        self.config.scale_factor = factor.clamp(0.5, 4.0);
        self
    }

    pub fn contrast_boost(mut self, boost: f32) -> Self {
        self.config.contrast_boost = boost;
        self
    }

    pub fn fast_preprocess(mut self, fast: bool) -> Self {
        self.config.fast_preprocess = fast;
        self
    }

    pub fn engine_chain(mut self, chain: Vec<EngineKind>) -> Self {
        self.config.engine_chain = chain;
        self
    }

    pub fn vision_page_cap(mut self, cap: usize) -> Self {
        self.config.vision_page_cap = cap.max(1);
        self
    }

    pub fn prompt_contract(mut self, contract: PromptContract) -> Self {
        self.config.prompt_contract = contract;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn ai_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ai_timeout_secs = secs.max(1);
        self
    }

    pub fn ai_attempts(mut self, n: u32) -> Self {
        self.config.ai_attempts = n.max(1);
        self
    }

    pub fn storage_attempts(mut self, n: u32) -> Self {
        self.config.storage_attempts = n.max(1);
        self
    }

    pub fn storage_backoff_ms(mut self, ms: u64) -> Self {
        self.config.storage_backoff_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn ocr(mut self, options: OcrOptions) -> Self {
        self.config.ocr = options;
        self
    }

    /// Build the configuration, validating cross-field constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.engine_chain.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "engine_chain must name at least one extraction engine".into(),
            ));
        }
        if !(72..=400).contains(&c.dpi) {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_profile() {
        let c = PipelineConfig::default();
        assert_eq!(c.dpi, 200);
        assert_eq!(c.page_cap, 4);
        assert_eq!(c.ai_timeout_secs, 90);
        assert_eq!(c.ai_attempts, 2);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.engine_chain, vec![EngineKind::Vision, EngineKind::LocalOcr]);
        assert_eq!(c.prompt_contract, PromptContract::Verbatim);
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let c = PipelineConfig::builder()
            .dpi(10_000)
            .scale_factor(99.0)
            .page_cap(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 400);
        assert_eq!(c.scale_factor, 4.0);
        assert_eq!(c.page_cap, 1);
    }

    #[test]
    fn empty_engine_chain_rejected() {
        let err = PipelineConfig::builder()
            .engine_chain(Vec::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
