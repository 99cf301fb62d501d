//! Text extraction: route a detected document to its extractor and turn
//! every failure into a value.
//!
//! This is the per-format boundary. Nothing below it is allowed to abort a
//! classification: corrupt files, missing engines, panicking parsers and
//! timeouts all come back as [`ExtractionOutcome::Failed`], logged once with
//! the filename and format.

use crate::config::ClassifierConfig;
use crate::error::ExtractError;
use crate::pipeline::detect::DocumentFormat;
use crate::pipeline::input::{UploadedDocument, Workspace};
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::{office, pdf};
use std::time::Duration;
use tracing::{debug, warn};

/// Result of extracting one document.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// Non-empty, trimmed text.
    Text(String),
    /// Extraction worked but found no text (blank scan, empty sheet).
    Empty,
    /// Extraction failed; the document is unreadable.
    Failed(ExtractError),
}

impl ExtractionOutcome {
    fn from_result(result: Result<String, ExtractError>) -> Self {
        match result {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    ExtractionOutcome::Empty
                } else {
                    ExtractionOutcome::Text(text.to_string())
                }
            }
            Err(e) => ExtractionOutcome::Failed(e),
        }
    }

    /// The extracted text, empty for `Empty` and `Failed`.
    pub fn text(&self) -> &str {
        match self {
            ExtractionOutcome::Text(t) => t,
            _ => "",
        }
    }

    pub fn error(&self) -> Option<&ExtractError> {
        match self {
            ExtractionOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Extract the text of `doc`, already detected as `format`.
///
/// Owns the document's scratch [`Workspace`] (PDF and image branches only)
/// and the overall `extraction_timeout_secs` budget. The workspace is
/// removed before this returns, and also if the returned future is dropped.
pub async fn extract_document(
    doc: &UploadedDocument,
    format: DocumentFormat,
    ocr: &dyn OcrEngine,
    config: &ClassifierConfig,
) -> ExtractionOutcome {
    if doc.len() > config.max_upload_bytes {
        let e = ExtractError::TooLarge {
            size: doc.len(),
            limit: config.max_upload_bytes,
        };
        warn!("'{}' ({}) rejected: {}", doc.filename, format, e);
        return ExtractionOutcome::Failed(e);
    }

    let workspace = if format.needs_scratch() {
        match Workspace::create(config.temp_dir.as_deref()) {
            Ok(ws) => Some(ws),
            Err(e) => {
                warn!("'{}' ({}) extraction failed: {}", doc.filename, format, e);
                return ExtractionOutcome::Failed(e);
            }
        }
    } else {
        None
    };

    let secs = config.extraction_timeout_secs;
    let result = match tokio::time::timeout(
        Duration::from_secs(secs),
        extract_with(doc, format, workspace.as_ref(), ocr, config),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ExtractError::Timeout { secs }),
    };
    drop(workspace);

    let outcome = ExtractionOutcome::from_result(result);
    match &outcome {
        ExtractionOutcome::Text(t) => {
            debug!("'{}' ({}): extracted {} chars", doc.filename, format, t.len())
        }
        ExtractionOutcome::Empty => debug!("'{}' ({}): no text found", doc.filename, format),
        ExtractionOutcome::Failed(e) => {
            warn!("'{}' ({}) extraction failed: {}", doc.filename, format, e)
        }
    }
    outcome
}

async fn extract_with(
    doc: &UploadedDocument,
    format: DocumentFormat,
    workspace: Option<&Workspace>,
    ocr: &dyn OcrEngine,
    config: &ClassifierConfig,
) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Pdf => {
            let ws = require_workspace(workspace)?;
            pdf::extract_pdf(doc.bytes.clone(), ws, ocr, config).await
        }
        DocumentFormat::Image(_) => {
            let ws = require_workspace(workspace)?;
            let path = ws.materialize(format.extension(), &doc.bytes).await?;
            ocr.recognize(&path).await
        }
        DocumentFormat::Word => {
            let bytes = doc.bytes.clone();
            let limit = config.max_office_part_bytes;
            run_blocking(move || office::extract_docx(&bytes, limit)).await
        }
        DocumentFormat::Spreadsheet => {
            let bytes = doc.bytes.clone();
            let limit = config.max_office_part_bytes;
            run_blocking(move || office::extract_xlsx(&bytes, limit)).await
        }
    }
}

fn require_workspace(workspace: Option<&Workspace>) -> Result<&Workspace, ExtractError> {
    workspace.ok_or_else(|| ExtractError::TempStorage {
        detail: "no workspace for a format that needs one".into(),
    })
}

async fn run_blocking<F>(f: F) -> Result<String, ExtractError>
where
    F: FnOnce() -> Result<String, ExtractError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractError::TaskAborted {
            detail: format!("Office task panicked: {}", e),
        })?
}
