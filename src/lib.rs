//! # doctriage
//!
//! Classify uploaded business documents (invoices, bank statements, driver's
//! licenses, ...) by extracting their text and running it through a trained
//! TF-IDF + logistic-regression model.
//!
//! ## Why text classification?
//!
//! The documents that matter arrive as anything from born-digital PDFs to
//! phone photos of a card. Their layout varies wildly, but the words on them
//! do not: an invoice says "invoice", "total" and "due". Getting the words
//! out reliably (text layer first, OCR where there is none) and handing them
//! to a small linear model is fast, explainable and cheap to retrain.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (filename + bytes)
//!  │
//!  ├─ 1. Detect     extension allow-list: pdf, png, jpg, docx, xlsx
//!  ├─ 2. Extract    pdf text layer + per-page OCR fallback, image OCR,
//!  │                docx paragraphs, xlsx tables (spawn_blocking / child process)
//!  ├─ 3. Normalize  letters only, collapse whitespace, lowercase, stem
//!  ├─ 4. Vectorize  TF-IDF over the artifact's closed vocabulary
//!  ├─ 5. Predict    logistic regression → per-class probabilities
//!  └─ 6. Decide     label | "unknown" (no text, no known terms, low confidence)
//!                   | "error" (unsupported format, internal failure)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doctriage::{Classifier, ClassifierConfig, ModelArtifact};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = Arc::new(ModelArtifact::load("model.json")?);
//!     let classifier = Classifier::new(model, ClassifierConfig::default());
//!     let result = classifier.classify_path("upload.pdf").await?;
//!     println!("{} ({:?})", result.file_class, result.confidence());
//!     Ok(())
//! }
//! ```
//!
//! ## External Engines
//!
//! PDF parsing and rasterisation use pdfium, loaded at runtime from
//! `PDFIUM_LIB_PATH`, the working directory or the system library path.
//! OCR shells out to the `tesseract` executable. Neither is required to
//! classify Word or Excel files; when one is missing the affected documents
//! resolve to `unknown` with an [`ExtractError`] explaining why.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doctriage` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! doctriage = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod classify;
pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::{extract_text, Classifier};
pub use config::{ClassifierConfig, ClassifierConfigBuilder};
pub use dataset::{
    build_dataset, collect_tasks, dataset_statistics, save_dataset, DatasetOptions, DatasetTask,
    LabelledText,
};
pub use error::{DoctriageError, ErrorKind, ExtractError};
pub use model::ModelArtifact;
pub use output::{
    ClassProbability, ClassificationResult, Outcome, Stage, StageTimings, UnknownReason,
};
pub use pipeline::detect::{allowed, DetectError, DocumentFormat};
pub use pipeline::extract::ExtractionOutcome;
pub use pipeline::input::UploadedDocument;
pub use pipeline::normalize::{normalize, NormalizedText, NormalizerConfig};
pub use pipeline::ocr::{OcrEngine, TesseractOcr};
pub use progress::{DatasetProgressCallback, NoopProgressCallback, ProgressCallback};
