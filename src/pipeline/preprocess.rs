//! Input preparation: decode or rasterize, then normalize for recognition.
//!
//! ## Why spawn_blocking for PDFs?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves rasterisation onto the blocking thread
//! pool so Tokio workers never stall on CPU-heavy rendering.
//!
//! ## Normalization is best-effort
//!
//! The enhancement chain (grayscale, upscale, contrast, denoise, sharpen)
//! exists to help recognition on phone photos of handwritten forms. If any
//! step cannot run, the original decoded image is used unchanged: a missed
//! enhancement costs accuracy, a failed page costs the document.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::input::{MediaKind, PageImage, RawInput};
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

/// Turn validated input bytes into normalized page images, ready for OCR or
/// vision extraction.
pub async fn prepare_pages(
    input: &RawInput,
    config: &PipelineConfig,
) -> Result<Vec<PageImage>, PipelineError> {
    input.validate()?;
    match input.media {
        MediaKind::Image => {
            let image = image::load_from_memory(&input.bytes).map_err(|e| {
                PipelineError::InputValidation {
                    reason: format!("image decode failed: {e}"),
                }
            })?;
            let normalized = normalize(&image, config);
            Ok(vec![PageImage {
                index: 0,
                image: normalized,
            }])
        }
        MediaKind::Pdf => {
            let bytes = input.bytes.clone();
            let config = config.clone();
            let pages = tokio::task::spawn_blocking(move || rasterize_blocking(&bytes, &config))
                .await
                .map_err(|e| PipelineError::Extraction {
                    detail: format!("rasterisation task panicked: {e}"),
                })??;
            if pages.is_empty() {
                return Err(PipelineError::InputValidation {
                    reason: "PDF contains no renderable pages".into(),
                });
            }
            Ok(pages)
        }
    }
}

/// Blocking rasterisation of the first `page_cap` pages.
fn rasterize_blocking(
    bytes: &[u8],
    config: &PipelineConfig,
) -> Result<Vec<PageImage>, PipelineError> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PipelineError::InputValidation {
            reason: format!("PDF could not be opened: {e:?}"),
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    let take = total.min(config.page_cap);
    debug!(total, rendering = take, "PDF loaded");

    let mut results = Vec::with_capacity(take);
    for idx in 0..take {
        let page = match pages.get(idx as u16) {
            Ok(page) => page,
            Err(e) => {
                warn!(page = idx + 1, "skipping unrenderable page: {e:?}");
                continue;
            }
        };

        // Width from physical size and DPI, capped so page size never
        // dictates memory use.
        let width_pt = page.width().value;
        let target_width = ((width_pt * config.dpi as f32 / 72.0) as i32)
            .min(config.max_pixels as i32)
            .max(1);
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_maximum_height(config.max_pixels as i32);

        // Bound before matching so the bitmap's borrow of `page` drops first.
        let rendered = page.render_with_config(&render_config);
        match rendered {
            Ok(bitmap) => {
                let image = bitmap.as_image();
                debug!(
                    page = idx + 1,
                    width = image.width(),
                    height = image.height(),
                    "page rendered"
                );
                results.push(PageImage {
                    index: idx,
                    image: normalize(&image, config),
                });
            }
            Err(e) => {
                warn!(page = idx + 1, "render failed, skipping page: {e:?}");
            }
        }
    }
    Ok(results)
}

/// Normalize one page image for recognition. Falls back to the input
/// unchanged when enhancement cannot run.
pub fn normalize(image: &DynamicImage, config: &PipelineConfig) -> DynamicImage {
    enhance(image, config).unwrap_or_else(|| image.clone())
}

fn enhance(image: &DynamicImage, config: &PipelineConfig) -> Option<DynamicImage> {
    let gray = image.to_luma8();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    // Upscale, capped on the longest edge.
    let longest = w.max(h) as f32;
    let allowed = (config.max_pixels as f32 / longest).min(config.scale_factor);
    let scale = allowed.max(1.0);
    let (nw, nh) = ((w as f32 * scale) as u32, (h as f32 * scale) as u32);
    let mut working = DynamicImage::ImageLuma8(gray);
    if scale > 1.0 && nw > 0 && nh > 0 {
        working = working.resize_exact(nw, nh, FilterType::Lanczos3);
    }

    working = working.adjust_contrast(config.contrast_boost);

    if !config.fast_preprocess {
        let denoised = imageproc::filter::median_filter(&working.to_luma8(), 1, 1);
        working = DynamicImage::ImageLuma8(denoised);
    }

    working = working.unsharpen(1.2, 4);
    Some(working)
}
