//! Error types for the doctriage library.
//!
//! Three layers of failure, three types:
//!
//! * [`DoctriageError`] — **Fatal**: the classifier cannot be built or a
//!   caller-level operation cannot proceed (artifact missing or invalid,
//!   bad configuration, unreadable input path). Returned as
//!   `Err(DoctriageError)`.
//!
//! * [`ExtractError`] — **Non-fatal**: one document could not be turned into
//!   text (corrupt file, OCR engine missing, timeout). The orchestrator
//!   recovers it into an `unknown` result and keeps it on the
//!   [`crate::output::ClassificationResult`] for inspection.
//!
//! * [`ErrorKind`] — the stable, serialisable code attached to a result
//!   so callers can branch without matching on message text.
//!
//! ## Why not one enum?
//!
//! A corrupt upload is an everyday event for a classification service and
//! must never abort a batch. Keeping the per-document error separate from
//! the fatal one makes that impossible to get wrong at the type level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the doctriage library.
///
/// Per-document extraction failures use [`ExtractError`] and are stored on
/// the result rather than propagated here.
#[derive(Debug, Error)]
pub enum DoctriageError {
    // ── Model artifact errors ─────────────────────────────────────────────
    /// The artifact file does not exist.
    #[error("Model artifact not found: '{path}'\nTrain a model and export it as JSON, then pass it with --model.")]
    ArtifactNotFound { path: PathBuf },

    /// The artifact file exists but could not be read.
    #[error("Failed to read model artifact '{path}': {source}")]
    ArtifactRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact is not valid JSON or does not match the expected shape.
    #[error("Model artifact '{path}' could not be parsed: {detail}")]
    ArtifactParse { path: PathBuf, detail: String },

    /// The artifact was written by an incompatible exporter.
    #[error("Unsupported model artifact format version {found} (this build reads version {expected})")]
    UnsupportedArtifactVersion { found: u32, expected: u32 },

    /// The artifact parsed but its parts are inconsistent with each other.
    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Input file exists but could not be read.
    #[error("Failed to read input '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file type is not accepted for classification.
    #[error(transparent)]
    UnsupportedFormat(#[from] crate::pipeline::detect::DetectError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file (dataset JSON).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document's text extraction.
///
/// Never escapes the orchestrator: it becomes an `unknown` outcome and is
/// attached to [`crate::output::ClassificationResult::extraction_error`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractError {
    /// The upload is larger than the configured limit.
    #[error("Document is {size} bytes, above the {limit}-byte upload limit")]
    TooLarge { size: usize, limit: usize },

    /// pdfium could not be loaded.
    #[error(
        "PDF engine unavailable: {detail}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumUnavailable { detail: String },

    /// The PDF header/xref is broken.
    #[error("PDF is corrupt or unreadable: {detail}")]
    CorruptPdf { detail: String },

    /// The PDF needs a password.
    #[error("PDF is encrypted and cannot be read without a password")]
    Encrypted,

    /// A page could not be rasterised for OCR.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The OCR executable could not be started.
    #[error("OCR engine '{program}' could not be started: {detail}\nInstall tesseract or pass --tesseract-path.")]
    OcrUnavailable { program: String, detail: String },

    /// The OCR engine ran but reported failure.
    #[error("OCR failed: {detail}")]
    OcrFailed { detail: String },

    /// A single OCR call exceeded its budget.
    #[error("OCR timed out after {secs}s")]
    OcrTimeout { secs: u64 },

    /// The docx/xlsx container or its XML is broken.
    #[error("Office document is corrupt or unreadable: {detail}")]
    CorruptOffice { detail: String },

    /// A docx/xlsx part decompresses to more than the configured limit.
    #[error("Office part '{part}' inflates beyond the {limit}-byte limit")]
    PartTooLarge { part: String, limit: u64 },

    /// Scratch storage for the document could not be prepared.
    #[error("Temporary storage failed: {detail}")]
    TempStorage { detail: String },

    /// The whole extraction exceeded its budget.
    #[error("Extraction timed out after {secs}s")]
    Timeout { secs: u64 },

    /// A blocking extraction task panicked or was cancelled.
    #[error("Extraction task aborted: {detail}")]
    TaskAborted { detail: String },
}

/// Stable machine-readable failure code carried by a classification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The file type is not on the allow-list. User-correctable.
    UnsupportedFormat,
    /// Text could not be extracted; the document was classified as unknown.
    ExtractionFailed,
    /// A bug or artifact inconsistency hit while vectorising or predicting.
    InternalError,
}

impl ErrorKind {
    /// The wire code, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
