//! Classification entry points: the pipeline orchestrator.
//!
//! [`Classifier`] sequences the stages for one document:
//!
//! ```text
//! Received ─▶ FormatChecked ─▶ TextExtracted ─▶ Normalized ─▶ Vectorized ─▶ Predicted
//!    │              │                │                                          │
//!    ▼              ▼                ▼                                          ▼
//!  error      unknown (failed /   unknown (no text)                   label | unknown
//! (unsupported)  too large)
//! ```
//!
//! ## Why does `classify` not return `Result`?
//!
//! Every upload deserves an answer. An unsupported extension, an unreadable
//! scan, even a bug in the model code all map to a [`ClassificationResult`]
//! with a stable [`ErrorKind`], so a batch caller never loses the other
//! documents to one bad file. `Err` is reserved for caller-level problems
//! such as a path that does not exist.

use crate::config::ClassifierConfig;
use crate::error::{DoctriageError, ErrorKind};
use crate::model::ModelArtifact;
use crate::output::{ClassProbability, ClassificationResult, Outcome, Stage, UnknownReason};
use crate::pipeline::detect::{self, DocumentFormat};
use crate::pipeline::extract::{self, ExtractionOutcome};
use crate::pipeline::input::UploadedDocument;
use crate::pipeline::normalize::normalize;
use crate::pipeline::ocr::{OcrEngine, TesseractOcr};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Classifies uploaded documents with one loaded model.
///
/// Cheap to clone; clones share the model artifact, configuration and OCR
/// engine. Safe to use from many tasks at once.
///
/// # Example
/// ```rust,no_run
/// use doctriage::{Classifier, ClassifierConfig, ModelArtifact, UploadedDocument};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let model = Arc::new(ModelArtifact::load("model.json")?);
/// let classifier = Classifier::new(model, ClassifierConfig::default());
///
/// let bytes = std::fs::read("scan.pdf")?;
/// let result = classifier.classify(UploadedDocument::new("scan.pdf", bytes)).await;
/// println!("{}", result.file_class);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Classifier {
    model: Arc<ModelArtifact>,
    config: Arc<ClassifierConfig>,
    ocr: Arc<dyn OcrEngine>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("classes", &self.model.classes())
            .field("config", &self.config)
            .field("ocr", &self.ocr.name())
            .finish()
    }
}

/// What the model side decided for a piece of text.
struct Decision {
    outcome: Outcome,
    probabilities: Vec<ClassProbability>,
}

impl Classifier {
    /// Build a classifier using tesseract (per `config`) for OCR.
    pub fn new(model: Arc<ModelArtifact>, config: ClassifierConfig) -> Self {
        let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractOcr::from_config(&config));
        Self {
            model,
            config: Arc::new(config),
            ocr,
        }
    }

    /// Replace the OCR engine.
    pub fn with_ocr_engine(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn model(&self) -> &ModelArtifact {
        &self.model
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one uploaded document.
    pub async fn classify(&self, doc: UploadedDocument) -> ClassificationResult {
        let total_start = Instant::now();
        let filename = doc.filename.clone();
        info!("Classifying '{}' ({} bytes)", filename, doc.len());

        // ── Step 1: Format check ─────────────────────────────────────────────
        let format = match detect::detect(&doc.filename, &doc.bytes) {
            Ok(format) => format,
            Err(e) => {
                warn!("'{}' rejected: {}", filename, e);
                let mut result = ClassificationResult::new(
                    filename,
                    None,
                    Outcome::Failed {
                        error: ErrorKind::UnsupportedFormat,
                        stage: Stage::Received,
                        detail: e.to_string(),
                    },
                    Vec::new(),
                );
                result.timings.total_ms = total_start.elapsed().as_millis() as u64;
                return result;
            }
        };

        // ── Step 2: Extract text ─────────────────────────────────────────────
        let extract_start = Instant::now();
        let extraction = AssertUnwindSafe(extract::extract_document(
            &doc,
            format,
            self.ocr.as_ref(),
            &self.config,
        ))
        .catch_unwind()
        .await;
        let extract_ms = extract_start.elapsed().as_millis() as u64;
        drop(doc);

        let text = match extraction {
            Ok(ExtractionOutcome::Text(text)) => text,
            Ok(ExtractionOutcome::Empty) => {
                info!("'{}': no text extracted, resolving to unknown", filename);
                let mut result = self.unknown(filename, format, UnknownReason::NoText);
                result.timings.extract_ms = extract_ms;
                result.timings.total_ms = total_start.elapsed().as_millis() as u64;
                return result;
            }
            Ok(ExtractionOutcome::Failed(e)) => {
                let mut result = self.unknown(filename, format, UnknownReason::ExtractionFailed);
                result.extraction_error = Some(e);
                result.timings.extract_ms = extract_ms;
                result.timings.total_ms = total_start.elapsed().as_millis() as u64;
                return result;
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(
                    "'{}': extraction panicked after stage {}: {}",
                    filename,
                    Stage::FormatChecked,
                    detail
                );
                let mut result =
                    Self::internal_error(filename, Some(format), Stage::FormatChecked, detail);
                result.timings.extract_ms = extract_ms;
                result.timings.total_ms = total_start.elapsed().as_millis() as u64;
                return result;
            }
        };

        // ── Step 3: Normalise, vectorise, predict ────────────────────────────
        let predict_start = Instant::now();
        let mut result = self.decide_for(filename, Some(format), &text);
        result.text_chars = text.chars().count();
        result.timings.extract_ms = extract_ms;
        result.timings.predict_ms = predict_start.elapsed().as_millis() as u64;
        result.timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "'{}' → {} ({}ms total, {}ms extracting)",
            result.filename, result.file_class, result.timings.total_ms, extract_ms
        );
        result
    }

    /// Classify text that has already been extracted.
    ///
    /// Runs normalisation, vectorisation and prediction only. Empty text
    /// resolves to `unknown` like an empty document would.
    pub fn classify_text(&self, filename: impl Into<String>, text: &str) -> ClassificationResult {
        let filename = filename.into();
        let start = Instant::now();
        if text.trim().is_empty() {
            return ClassificationResult::new(
                filename,
                None,
                Outcome::Unknown {
                    reason: UnknownReason::NoText,
                },
                Vec::new(),
            );
        }
        let mut result = self.decide_for(filename, None, text);
        result.text_chars = text.chars().count();
        result.timings.predict_ms = start.elapsed().as_millis() as u64;
        result.timings.total_ms = result.timings.predict_ms;
        result
    }

    /// Read a file from disk and classify it. The filename is the path's last
    /// component.
    pub async fn classify_path(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<ClassificationResult, DoctriageError> {
        let doc = UploadedDocument::from_path(path).await?;
        Ok(self.classify(doc).await)
    }

    /// Synchronous wrapper around [`Classifier::classify`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn classify_sync(
        &self,
        doc: UploadedDocument,
    ) -> Result<ClassificationResult, DoctriageError> {
        Ok(tokio::runtime::Runtime::new()
            .map_err(|e| DoctriageError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.classify(doc)))
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    /// Run the model stages, turning errors and panics into a failed result.
    fn decide_for(
        &self,
        filename: String,
        format: Option<DocumentFormat>,
        text: &str,
    ) -> ClassificationResult {
        let mut stage = Stage::TextExtracted;
        let decided =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.decide(text, &mut stage)));

        let failure = match decided {
            Ok(Ok(decision)) => {
                return ClassificationResult::new(
                    filename,
                    format,
                    decision.outcome,
                    decision.probabilities,
                )
            }
            Ok(Err(detail)) => detail,
            Err(panic) => panic_message(panic.as_ref()),
        };
        error!(
            "'{}': internal error after stage {}: {}",
            filename, stage, failure
        );
        Self::internal_error(filename, format, stage, failure)
    }

    fn decide(&self, text: &str, stage: &mut Stage) -> Result<Decision, String> {
        let normalized = normalize(text, &self.model.normalizer);
        *stage = Stage::Normalized;
        if normalized.is_empty() {
            debug!("Normalisation left no text");
            return Ok(Decision {
                outcome: Outcome::Unknown {
                    reason: UnknownReason::NoText,
                },
                probabilities: Vec::new(),
            });
        }

        let features = self.model.vectorizer.transform(&normalized);
        *stage = Stage::Vectorized;
        debug!(
            "Vectorised {} words into {} active features",
            normalized.word_count(),
            features.nnz()
        );

        let prediction = self
            .model
            .classifier
            .predict(&features)
            .map_err(|e| e.to_string())?;
        *stage = Stage::Predicted;

        let probabilities = self
            .model
            .classes()
            .iter()
            .zip(&prediction.probabilities)
            .map(|(label, p)| ClassProbability {
                label: label.clone(),
                probability: *p,
            })
            .collect();

        let outcome = if features.is_zero() {
            Outcome::Unknown {
                reason: UnknownReason::NoRecognizedTerms,
            }
        } else if self
            .config
            .min_confidence
            .is_some_and(|min| prediction.confidence < min)
        {
            debug!(
                "Top class '{}' at {:.3} is below the confidence floor",
                prediction.label, prediction.confidence
            );
            Outcome::Unknown {
                reason: UnknownReason::LowConfidence,
            }
        } else {
            Outcome::Classified {
                label: prediction.label,
            }
        };

        Ok(Decision {
            outcome,
            probabilities,
        })
    }

    fn unknown(
        &self,
        filename: String,
        format: DocumentFormat,
        reason: UnknownReason,
    ) -> ClassificationResult {
        ClassificationResult::new(
            filename,
            Some(format),
            Outcome::Unknown { reason },
            Vec::new(),
        )
    }

    fn internal_error(
        filename: String,
        format: Option<DocumentFormat>,
        stage: Stage,
        detail: String,
    ) -> ClassificationResult {
        ClassificationResult::new(
            filename,
            format,
            Outcome::Failed {
                error: ErrorKind::InternalError,
                stage,
                detail,
            },
            Vec::new(),
        )
    }
}

/// Read a file from disk and extract its text without classifying it.
///
/// Returns `Err` only if the file cannot be read or its type is not
/// accepted; extraction problems come back as [`ExtractionOutcome::Failed`].
pub async fn extract_text(
    path: impl AsRef<Path>,
    config: &ClassifierConfig,
) -> Result<ExtractionOutcome, DoctriageError> {
    let doc = UploadedDocument::from_path(path).await?;
    let format = detect::detect(&doc.filename, &doc.bytes)?;
    let ocr = TesseractOcr::from_config(config);
    Ok(extract::extract_document(&doc, format, &ocr, config).await)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with a non-string payload".to_string()
    }
}
