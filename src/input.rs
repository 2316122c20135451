//! Raw input and page-image types.
//!
//! A [`RawInput`] is the immutable byte buffer handed to the pipeline plus
//! the media kind declared at upload time. Magic-byte validation happens here
//! once, before any stage runs, so later stages can assume the declared kind
//! matches the bytes.

use crate::error::PipelineError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Declared media kind of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Pdf,
}

impl MediaKind {
    /// Infer the media kind from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<MediaKind> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" => Some(MediaKind::Image),
            "pdf" => Some(MediaKind::Pdf),
            _ => None,
        }
    }
}

/// Opaque input bytes plus declared media kind; immutable once received.
#[derive(Debug, Clone)]
pub struct RawInput {
    pub bytes: Vec<u8>,
    pub media: MediaKind,
}

impl RawInput {
    pub fn new(bytes: Vec<u8>, media: MediaKind) -> Self {
        RawInput { bytes, media }
    }

    /// Check the buffer is non-empty and its magic bytes match the declared
    /// media kind.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.bytes.is_empty() {
            return Err(PipelineError::InputValidation {
                reason: "empty input buffer".into(),
            });
        }
        match self.media {
            MediaKind::Pdf => {
                if !self.bytes.starts_with(b"%PDF") {
                    return Err(PipelineError::InputValidation {
                        reason: "declared PDF but bytes lack a %PDF header".into(),
                    });
                }
            }
            MediaKind::Image => {
                let is_png = self.bytes.starts_with(&[0x89, b'P', b'N', b'G']);
                let is_jpeg = self.bytes.starts_with(&[0xFF, 0xD8, 0xFF]);
                if !is_png && !is_jpeg {
                    return Err(PipelineError::InputValidation {
                        reason: "declared image but bytes are neither PNG nor JPEG".into(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// One normalized bitmap derived from a [`RawInput`]: the whole image, or one
/// rasterized PDF page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based page index within the source document.
    pub index: usize,
    pub image: DynamicImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_rejected() {
        let input = RawInput::new(Vec::new(), MediaKind::Image);
        assert!(matches!(
            input.validate(),
            Err(PipelineError::InputValidation { .. })
        ));
    }

    #[test]
    fn pdf_magic_enforced() {
        let bad = RawInput::new(b"not a pdf".to_vec(), MediaKind::Pdf);
        assert!(bad.validate().is_err());
        let good = RawInput::new(b"%PDF-1.7 rest".to_vec(), MediaKind::Pdf);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn image_magic_enforced() {
        let png = RawInput::new(vec![0x89, b'P', b'N', b'G', 0x0D], MediaKind::Image);
        assert!(png.validate().is_ok());
        let jpeg = RawInput::new(vec![0xFF, 0xD8, 0xFF, 0xE0], MediaKind::Image);
        assert!(jpeg.validate().is_ok());
        let text = RawInput::new(b"hello".to_vec(), MediaKind::Image);
        assert!(text.validate().is_err());
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(MediaKind::from_extension("PNG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_extension("pdf"), Some(MediaKind::Pdf));
        assert_eq!(MediaKind::from_extension("txt"), None);
    }
}
