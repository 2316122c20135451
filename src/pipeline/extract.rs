//! Extraction engines: turn page images into text or tables.
//!
//! Two engines exist behind one entry point. The vision engine sends page
//! images straight to the multimodal model and gets tables back in a single
//! hop. The local OCR engine recognizes text page by page and leaves
//! structuring to the next stage. The orchestrator walks the configured
//! engine chain and treats each engine's output uniformly via [`Extraction`].

use crate::backend::{EncodedImage, GenerateRequest, GenerativeBackend, OcrBackend};
use crate::config::{EngineKind, PipelineConfig};
use crate::error::PipelineError;
use crate::input::PageImage;
use crate::pipeline::structure::{call_with_deadline, parse_table_payload};
use crate::prompts;
use crate::table::TableSet;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io::Cursor;
use tracing::{debug, warn};

/// What an extraction engine produced.
#[derive(Debug)]
pub enum Extraction {
    /// Vision engines return tables directly; no structuring stage needed.
    Tables(TableSet),
    /// OCR engines return raw text for the structuring stage.
    Text(String),
}

/// Run one engine over the prepared pages.
pub async fn run_engine(
    kind: EngineKind,
    pages: &[PageImage],
    ai: &dyn GenerativeBackend,
    ocr: &dyn OcrBackend,
    config: &PipelineConfig,
) -> Result<Extraction, PipelineError> {
    match kind {
        EngineKind::Vision => vision_extract(pages, ai, config).await.map(Extraction::Tables),
        EngineKind::LocalOcr => ocr_extract(pages, ocr, config).await.map(Extraction::Text),
    }
}

/// Recognize text on every page and join the results.
async fn ocr_extract(
    pages: &[PageImage],
    ocr: &dyn OcrBackend,
    config: &PipelineConfig,
) -> Result<String, PipelineError> {
    let mut chunks: Vec<String> = Vec::with_capacity(pages.len());
    for page in pages {
        match ocr.recognize(&page.image, &config.ocr).await {
            Ok(text) => {
                debug!(page = page.index + 1, chars = text.len(), "page recognized");
                chunks.push(text);
            }
            Err(e) => {
                // One bad page never sinks the document.
                warn!(page = page.index + 1, "OCR failed on page: {e}");
            }
        }
    }
    let joined = chunks.join("\n");
    if joined.trim().is_empty() {
        return Err(PipelineError::NoReadableText);
    }
    Ok(joined)
}

/// Send up to `vision_page_cap` page images to the multimodal model and parse
/// the table payload out of its response.
async fn vision_extract(
    pages: &[PageImage],
    ai: &dyn GenerativeBackend,
    config: &PipelineConfig,
) -> Result<TableSet, PipelineError> {
    let images: Vec<EncodedImage> = pages
        .iter()
        .take(config.vision_page_cap)
        .map(encode_page)
        .collect::<Result<_, _>>()?;
    if images.is_empty() {
        return Err(PipelineError::Extraction {
            detail: "no pages to send to the vision engine".into(),
        });
    }

    let request = GenerateRequest {
        prompt: prompts::vision_prompt(config.prompt_contract).to_string(),
        images,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let response = call_with_deadline(ai, &request, config).await?;
    match parse_table_payload(&response) {
        Some(tables) if !tables.tables.is_empty() => Ok(tables),
        _ => Err(PipelineError::Extraction {
            detail: "vision response carried no parseable tables".into(),
        }),
    }
}

/// PNG-encode a page and wrap it as a base64 attachment.
fn encode_page(page: &PageImage) -> Result<EncodedImage, PipelineError> {
    let mut png = Vec::new();
    page.image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| PipelineError::Extraction {
            detail: format!("page {} PNG encoding failed: {e}", page.index + 1),
        })?;
    Ok(EncodedImage {
        data: STANDARD.encode(&png),
        mime_type: "image/png".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, OcrOptions};
    use async_trait::async_trait;
    use image::DynamicImage;

    struct StaticOcr(&'static str);

    #[async_trait]
    impl OcrBackend for StaticOcr {
        async fn recognize(
            &self,
            _image: &DynamicImage,
            _options: &OcrOptions,
        ) -> Result<String, BackendError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingOcr;

    #[async_trait]
    impl OcrBackend for FailingOcr {
        async fn recognize(
            &self,
            _image: &DynamicImage,
            _options: &OcrOptions,
        ) -> Result<String, BackendError> {
            Err(BackendError::Other("engine crashed".into()))
        }
    }

    fn page(index: usize) -> PageImage {
        PageImage {
            index,
            image: DynamicImage::new_luma8(8, 8),
        }
    }

    #[tokio::test]
    async fn ocr_joins_pages_in_order() {
        let config = PipelineConfig::default();
        let pages = vec![page(0), page(1)];
        let out = ocr_extract(&pages, &StaticOcr("line"), &config).await.unwrap();
        assert_eq!(out, "line\nline");
    }

    #[tokio::test]
    async fn blank_ocr_output_is_no_readable_text() {
        let config = PipelineConfig::default();
        let err = ocr_extract(&[page(0)], &StaticOcr("  \n "), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoReadableText));
    }

    #[tokio::test]
    async fn all_pages_failing_is_no_readable_text() {
        let config = PipelineConfig::default();
        let err = ocr_extract(&[page(0), page(1)], &FailingOcr, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoReadableText));
    }

    #[test]
    fn encode_page_produces_png_base64() {
        let encoded = encode_page(&page(0)).unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        let decoded = STANDARD.decode(&encoded.data).unwrap();
        assert_eq!(&decoded[1..4], b"PNG");
    }
}
