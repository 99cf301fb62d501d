//! OCR: turn a raster image on disk into text.
//!
//! The default engine shells out to the Tesseract CLI
//! (`tesseract <image> stdout -l <lang> --psm <mode>`). The child process is
//! spawned with `kill_on_drop`, so a timed-out or cancelled classification
//! never leaves a stray tesseract running.
//!
//! ## Why a trait?
//!
//! Tesseract is an external binary that is often missing from CI machines.
//! [`OcrEngine`] lets the pipeline be exercised end-to-end with a stand-in
//! engine, and lets deployments swap in a different recogniser without
//! touching the extraction code.

use crate::config::ClassifierConfig;
use crate::error::ExtractError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Something that can read text off an image file.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Recognise the text in the image at `image_path`.
    ///
    /// A blank image yields `Ok` with empty (or whitespace-only) text.
    async fn recognize(&self, image_path: &Path) -> Result<String, ExtractError>;
}

/// [`OcrEngine`] backed by the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: PathBuf,
    language: String,
    psm: u8,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(
        program: impl Into<PathBuf>,
        language: impl Into<String>,
        psm: u8,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
            psm,
            timeout,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(
            config.tesseract_path.clone(),
            config.ocr_language.clone(),
            config.ocr_psm,
            Duration::from_secs(config.ocr_timeout_secs),
        )
    }

    /// Command-line arguments for one recognition run.
    pub fn args(&self, image_path: &Path) -> Vec<OsString> {
        vec![
            image_path.as_os_str().to_owned(),
            "stdout".into(),
            "-l".into(),
            self.language.clone().into(),
            "--psm".into(),
            self.psm.to_string().into(),
        ]
    }

    /// Whether the executable can be started at all (`tesseract --version`).
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image_path: &Path) -> Result<String, ExtractError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(image_path))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(ExtractError::OcrTimeout {
                    secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) => {
                return Err(ExtractError::OcrUnavailable {
                    program: self.program_name(),
                    detail: e.to_string(),
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::OcrFailed {
                detail: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(
            "OCR read {} chars from '{}'",
            text.trim().len(),
            image_path.display()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(program: &str) -> TesseractOcr {
        TesseractOcr::new(program, "eng", 6, Duration::from_secs(5))
    }

    #[test]
    fn args_request_stdout_language_and_psm() {
        let args = engine("tesseract").args(Path::new("/tmp/page-0001.png"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["/tmp/page-0001.png", "stdout", "-l", "eng", "--psm", "6"]
        );
    }

    #[test]
    fn from_config_copies_settings() {
        let config = ClassifierConfig::builder()
            .ocr_language("deu")
            .ocr_psm(4)
            .ocr_timeout_secs(9)
            .build()
            .unwrap();
        let ocr = TesseractOcr::from_config(&config);
        assert_eq!(ocr.language, "deu");
        assert_eq!(ocr.psm, 4);
        assert_eq!(ocr.timeout, Duration::from_secs(9));
    }

    #[test]
    fn missing_binary_is_not_available() {
        assert!(!engine("/nonexistent/tesseract").is_available());
    }

    #[tokio::test]
    async fn missing_binary_reports_unavailable() {
        let err = engine("/nonexistent/tesseract")
            .recognize(Path::new("whatever.png"))
            .await
            .unwrap_err();
        match err {
            ExtractError::OcrUnavailable { program, .. } => {
                assert_eq!(program, "/nonexistent/tesseract")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
