//! Classification result types.
//!
//! A [`ClassificationResult`] is built once at the end of a classification
//! call and never mutated. It always exists: unsupported uploads, unreadable
//! documents and internal failures are all expressed through its
//! [`Outcome`] rather than through `Err`.

use crate::error::{ErrorKind, ExtractError};
use crate::pipeline::detect::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label reported when a document could not be assigned a class.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Label reported when classification failed outright.
pub const ERROR_LABEL: &str = "error";

/// Why a document resolved to [`UNKNOWN_LABEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// Extraction worked but produced no text.
    NoText,
    /// Extraction failed (corrupt file, OCR unavailable, timeout, too large).
    ExtractionFailed,
    /// The text contained no vocabulary terms.
    NoRecognizedTerms,
    /// The best class scored below the configured minimum confidence.
    LowConfidence,
}

/// The last pipeline state reached by a classification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    FormatChecked,
    TextExtracted,
    Normalized,
    Vectorized,
    Predicted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::FormatChecked => "format_checked",
            Stage::TextExtracted => "text_extracted",
            Stage::Normalized => "normalized",
            Stage::Vectorized => "vectorized",
            Stage::Predicted => "predicted",
        };
        f.write_str(s)
    }
}

/// Final decision for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// A class from the model artifact.
    Classified { label: String },
    /// No class could be assigned.
    Unknown { reason: UnknownReason },
    /// The request could not be processed.
    Failed {
        error: ErrorKind,
        /// Last state completed before the failure.
        stage: Stage,
        detail: String,
    },
}

/// Probability of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f64,
}

/// Wall-clock time spent per stage, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub extract_ms: u64,
    pub predict_ms: u64,
    pub total_ms: u64,
}

/// Everything known about one classified document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Declared filename of the upload.
    pub filename: String,
    /// The label to report: a class, `"unknown"` or `"error"`.
    pub file_class: String,
    pub outcome: Outcome,
    /// Detected format; `None` when the upload was rejected.
    pub format: Option<DocumentFormat>,
    /// Per-class probabilities in artifact order. Empty unless the predictor ran.
    pub probabilities: Vec<ClassProbability>,
    /// Characters of extracted (pre-normalisation) text.
    pub text_chars: usize,
    /// Why extraction failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<ExtractError>,
    pub timings: StageTimings,
}

impl ClassificationResult {
    pub(crate) fn new(
        filename: String,
        format: Option<DocumentFormat>,
        outcome: Outcome,
        probabilities: Vec<ClassProbability>,
    ) -> Self {
        let file_class = outcome_label(&outcome).to_string();
        Self {
            filename,
            file_class,
            outcome,
            format,
            probabilities,
            text_chars: 0,
            extraction_error: None,
            timings: StageTimings::default(),
        }
    }

    /// The reported label: a class name, `"unknown"` or `"error"`.
    pub fn label(&self) -> &str {
        &self.file_class
    }

    pub fn is_classified(&self) -> bool {
        matches!(self.outcome, Outcome::Classified { .. })
    }

    /// Stable error code for unsupported, unreadable and failed documents.
    pub fn error_code(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Failed { error, .. } => Some(*error),
            Outcome::Unknown {
                reason: UnknownReason::ExtractionFailed,
            } => Some(ErrorKind::ExtractionFailed),
            _ => None,
        }
    }

    /// Probability reported for `label`, if the predictor ran.
    pub fn probability_of(&self, label: &str) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|p| p.label == label)
            .map(|p| p.probability)
    }

    /// Highest class probability, if the predictor ran.
    pub fn confidence(&self) -> Option<f64> {
        self.probabilities
            .iter()
            .map(|p| p.probability)
            .fold(None, |best, p| Some(best.map_or(p, |b: f64| b.max(p))))
    }
}

fn outcome_label(outcome: &Outcome) -> &str {
    match outcome {
        Outcome::Classified { label } => label,
        Outcome::Unknown { .. } => UNKNOWN_LABEL,
        Outcome::Failed { .. } => ERROR_LABEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs() -> Vec<ClassProbability> {
        vec![
            ClassProbability {
                label: "bank_statement".into(),
                probability: 0.1,
            },
            ClassProbability {
                label: "invoice".into(),
                probability: 0.9,
            },
        ]
    }

    #[test]
    fn label_follows_outcome() {
        let r = ClassificationResult::new(
            "a.pdf".into(),
            Some(DocumentFormat::Pdf),
            Outcome::Classified {
                label: "invoice".into(),
            },
            probs(),
        );
        assert_eq!(r.label(), "invoice");
        assert!(r.is_classified());
        assert_eq!(r.error_code(), None);
        assert_eq!(r.probability_of("invoice"), Some(0.9));
        assert_eq!(r.confidence(), Some(0.9));

        let r = ClassificationResult::new(
            "a.pdf".into(),
            Some(DocumentFormat::Pdf),
            Outcome::Unknown {
                reason: UnknownReason::ExtractionFailed,
            },
            Vec::new(),
        );
        assert_eq!(r.label(), UNKNOWN_LABEL);
        assert_eq!(r.error_code(), Some(ErrorKind::ExtractionFailed));
        assert_eq!(r.confidence(), None);
    }

    #[test]
    fn failed_outcome_serialises_with_stable_codes() {
        let r = ClassificationResult::new(
            "notes.txt".into(),
            None,
            Outcome::Failed {
                error: ErrorKind::UnsupportedFormat,
                stage: Stage::Received,
                detail: "File type not allowed".into(),
            },
            Vec::new(),
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["file_class"], "error");
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["error"], "unsupported_format");
        assert_eq!(json["outcome"]["stage"], "received");
        assert!(json.get("extraction_error").is_none());
    }

    #[test]
    fn stage_display_matches_serde() {
        for stage in [Stage::Received, Stage::Normalized, Stage::Predicted] {
            assert_eq!(
                serde_json::to_string(&stage).unwrap(),
                format!("\"{stage}\"")
            );
        }
    }
}
