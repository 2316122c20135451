//! Local OCR via the `tesseract` command-line binary.
//!
//! The engine runs out of process: the image is written to a temp file, the
//! binary is invoked with explicit engine/segmentation/language flags, and
//! stdout is the recognized text. Process isolation means an engine crash on
//! a pathological image never takes the service down, at the cost of one
//! temp-file round trip per page.

use crate::backend::{BackendError, OcrBackend, OcrOptions};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// [`OcrBackend`] that shells out to the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    /// Binary to invoke. Default `tesseract`, resolved via `PATH`.
    binary: PathBuf,
}

impl Default for TesseractBackend {
    fn default() -> Self {
        TesseractBackend {
            binary: PathBuf::from("tesseract"),
        }
    }
}

impl TesseractBackend {
    /// Use an explicit binary path instead of `PATH` resolution.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        TesseractBackend {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    async fn recognize(
        &self,
        image: &DynamicImage,
        options: &OcrOptions,
    ) -> Result<String, BackendError> {
        // The temp dir (and the PNG inside it) is removed on drop, including
        // on every early-return path.
        let dir = tempfile::tempdir()
            .map_err(|e| BackendError::Other(format!("temp dir creation failed: {e}")))?;
        let input_path = dir.path().join("page.png");
        image
            .save(&input_path)
            .map_err(|e| BackendError::Other(format!("temp image write failed: {e}")))?;

        debug!(
            languages = %options.languages,
            oem = options.engine_mode,
            psm = options.segmentation_mode,
            "running local OCR"
        );

        // `stdout` as the output base makes tesseract print text instead of
        // writing a sidecar file.
        let output = Command::new(&self.binary)
            .arg(&input_path)
            .arg("stdout")
            .args(["--oem", &options.engine_mode.to_string()])
            .args(["--psm", &options.segmentation_mode.to_string()])
            .args(["-l", &options.languages])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BackendError::Other(format!("failed to spawn {:?}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Other(format!(
                "OCR engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_reported_not_panicked() {
        let backend = TesseractBackend::with_binary("/nonexistent/tesseract-binary");
        let image = DynamicImage::new_rgb8(4, 4);
        let err = backend
            .recognize(&image, &OcrOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Other(_)));
        assert!(err.to_string().contains("spawn"));
    }

    #[test]
    fn default_options_match_engine_profile() {
        let options = OcrOptions::default();
        assert_eq!(options.engine_mode, 3);
        assert_eq!(options.segmentation_mode, 6);
        assert_eq!(options.languages, "eng+amh");
    }
}
