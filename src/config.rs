//! Configuration types for document classification.
//!
//! Every extraction and decision knob lives in [`ClassifierConfig`], built via
//! [`ClassifierConfigBuilder`]. The model itself is not configuration: it is a
//! separately loaded [`crate::model::ModelArtifact`] so one artifact can be
//! shared by classifiers with different runtime limits.

use crate::error::DoctriageError;
use std::path::PathBuf;

/// Default upload ceiling: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Default ceiling for one decompressed docx/xlsx part: 256 MiB.
pub const DEFAULT_MAX_OFFICE_PART_BYTES: u64 = 256 * 1024 * 1024;

/// Configuration for a [`crate::Classifier`].
///
/// Built via [`ClassifierConfig::builder()`] or using
/// [`ClassifierConfig::default()`].
///
/// # Example
/// ```rust
/// use doctriage::ClassifierConfig;
///
/// let config = ClassifierConfig::builder()
///     .ocr_language("eng+deu")
///     .min_confidence(0.5)
///     .build()
///     .unwrap();
/// assert_eq!(config.ocr_psm, 6);
/// ```
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Budget for extracting text from one document, in seconds. Default: 120.
    ///
    /// Covers every page of a PDF including OCR fallbacks. On expiry the
    /// document resolves to `unknown` and its scratch directory is removed.
    pub extraction_timeout_secs: u64,

    /// Budget for a single OCR invocation, in seconds. Default: 60.
    pub ocr_timeout_secs: u64,

    /// Tesseract language pack(s), e.g. "eng" or "eng+fra". Default: "eng".
    pub ocr_language: String,

    /// Tesseract page segmentation mode. Range: 0–13. Default: 6.
    ///
    /// Mode 6 ("assume a single uniform block of text") reads invoices and
    /// statements far better than the automatic layout analysis of mode 3.
    pub ocr_psm: u8,

    /// Path or name of the tesseract executable. Default: "tesseract".
    pub tesseract_path: PathBuf,

    /// Maximum rendered image dimension (width or height) in pixels when a PDF
    /// page is rasterised for OCR. Default: 2000.
    ///
    /// A safety cap: an A0 poster rendered at full resolution would exhaust
    /// memory long before tesseract sees it.
    pub max_rendered_pixels: u32,

    /// Minimum top-class probability for a label to be reported. Default: None.
    ///
    /// Below it the document resolves to `unknown` (low confidence), with the
    /// probabilities still attached.
    pub min_confidence: Option<f64>,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Largest decompressed XML part read from a docx/xlsx archive, in bytes.
    /// Default: 256 MiB.
    ///
    /// `max_upload_bytes` only bounds the compressed container; a few
    /// kilobytes of deflate can inflate to gigabytes.
    pub max_office_part_bytes: u64,

    /// Parent directory for per-document scratch directories. Default: None
    /// (system temp directory).
    pub temp_dir: Option<PathBuf>,

    /// Location of the pdfium shared library (file or directory). Default: None.
    ///
    /// When unset, `PDFIUM_LIB_PATH` is consulted, then the working
    /// directory, then the system library search path.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            extraction_timeout_secs: 120,
            ocr_timeout_secs: 60,
            ocr_language: "eng".to_string(),
            ocr_psm: 6,
            tesseract_path: PathBuf::from("tesseract"),
            max_rendered_pixels: 2000,
            min_confidence: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_office_part_bytes: DEFAULT_MAX_OFFICE_PART_BYTES,
            temp_dir: None,
            pdfium_library_path: None,
        }
    }
}

impl ClassifierConfig {
    /// Create a new builder for `ClassifierConfig`.
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClassifierConfig`].
#[derive(Debug)]
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl ClassifierConfigBuilder {
    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs.max(1);
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs.max(1);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_psm(mut self, psm: u8) -> Self {
        self.config.ocr_psm = psm.min(13);
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn min_confidence(mut self, p: f64) -> Self {
        self.config.min_confidence = Some(p);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn max_office_part_bytes(mut self, bytes: u64) -> Self {
        self.config.max_office_part_bytes = bytes;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClassifierConfig, DoctriageError> {
        let c = &self.config;
        if c.ocr_language.trim().is_empty() {
            return Err(DoctriageError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.tesseract_path.as_os_str().is_empty() {
            return Err(DoctriageError::InvalidConfig(
                "Tesseract path must not be empty".into(),
            ));
        }
        if let Some(p) = c.min_confidence {
            if !(0.0..=1.0).contains(&p) {
                return Err(DoctriageError::InvalidConfig(format!(
                    "Minimum confidence must be 0.0–1.0, got {}",
                    p
                )));
            }
        }
        if c.max_upload_bytes == 0 {
            return Err(DoctriageError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if c.max_office_part_bytes == 0 {
            return Err(DoctriageError::InvalidConfig(
                "Office part limit must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ClassifierConfig::default();
        assert_eq!(c.extraction_timeout_secs, 120);
        assert_eq!(c.ocr_timeout_secs, 60);
        assert_eq!(c.ocr_language, "eng");
        assert_eq!(c.ocr_psm, 6);
        assert_eq!(c.max_rendered_pixels, 2000);
        assert!(c.min_confidence.is_none());
        assert_eq!(c.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(c.max_office_part_bytes, DEFAULT_MAX_OFFICE_PART_BYTES);
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let c = ClassifierConfig::builder()
            .ocr_psm(42)
            .max_rendered_pixels(10)
            .extraction_timeout_secs(0)
            .ocr_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.ocr_psm, 13);
        assert_eq!(c.max_rendered_pixels, 100);
        assert_eq!(c.extraction_timeout_secs, 1);
        assert_eq!(c.ocr_timeout_secs, 1);
    }

    #[test]
    fn build_rejects_bad_confidence() {
        let err = ClassifierConfig::builder()
            .min_confidence(1.5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("1.5"), "got: {err}");
    }

    #[test]
    fn build_rejects_zero_office_part_limit() {
        let err = ClassifierConfig::builder()
            .max_office_part_bytes(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Office part"), "got: {err}");
    }

    #[test]
    fn build_rejects_empty_language() {
        assert!(ClassifierConfig::builder().ocr_language("  ").build().is_err());
    }
}
