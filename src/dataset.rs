//! Labelled dataset building: turn a folder-per-label corpus into
//! `(text, label)` pairs for training.
//!
//! ```text
//! root/
//!   invoice/          ──▶ label "invoice"
//!     a.pdf  b.png
//!   bank_statement/   ──▶ label "bank_statement"
//!     c.xlsx
//! ```
//!
//! Every file runs through the same extraction and normalisation as
//! inference, so the vocabulary a model learns from this output is the one
//! it will see when classifying.
//!
//! ## Why an explicit task list?
//!
//! Directory walking is cheap and finishes before any extraction starts.
//! The resulting `(path, label)` list is then fed to a bounded pool
//! (`buffer_unordered`), which keeps at most `concurrency` documents (and
//! their scratch directories) alive at once. The output is sorted by path so
//! two runs over the same corpus produce byte-identical JSON.

use crate::config::ClassifierConfig;
use crate::error::DoctriageError;
use crate::pipeline::detect;
use crate::pipeline::extract::{extract_document, ExtractionOutcome};
use crate::pipeline::input::UploadedDocument;
use crate::pipeline::normalize::{normalize, NormalizerConfig};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr};
use crate::progress::{DatasetProgressCallback, NoopProgressCallback, ProgressCallback};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of documents extracted at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Settings for [`build_dataset`].
#[derive(Clone)]
pub struct DatasetOptions {
    /// Extraction settings (timeouts, OCR, size limit).
    pub config: ClassifierConfig,
    /// Cleanup applied to every extracted text.
    pub normalizer: NormalizerConfig,
    /// Maximum documents in flight.
    pub concurrency: usize,
    /// OCR engine; `None` uses tesseract per `config`.
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub progress: ProgressCallback,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            config: ClassifierConfig::default(),
            normalizer: NormalizerConfig::training(),
            concurrency: DEFAULT_CONCURRENCY,
            ocr: None,
            progress: Arc::new(NoopProgressCallback),
        }
    }
}

impl std::fmt::Debug for DatasetOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetOptions")
            .field("config", &self.config)
            .field("normalizer", &self.normalizer)
            .field("concurrency", &self.concurrency)
            .field("ocr", &self.ocr.as_ref().map(|o| o.name().to_string()))
            .finish()
    }
}

impl DatasetOptions {
    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Clamped to at least 1.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_ocr_engine(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }
}

/// One file to extract, labelled by its parent directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DatasetTask {
    pub path: PathBuf,
    pub label: String,
}

/// One dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledText {
    /// Source file.
    pub path: PathBuf,
    pub label: String,
    /// Normalised text.
    pub text: String,
}

/// List the allowed files under `root`, one label per sub-directory.
///
/// Files directly inside `root`, nested sub-directories and files whose
/// extension is not accepted are skipped. Sorted by path.
pub fn collect_tasks(root: impl AsRef<Path>) -> Result<Vec<DatasetTask>, DoctriageError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(DoctriageError::FileNotFound {
            path: root.to_path_buf(),
        });
    }

    let read_dir = |dir: &Path| {
        std::fs::read_dir(dir).map_err(|source| DoctriageError::InputRead {
            path: dir.to_path_buf(),
            source,
        })
    };

    let mut tasks = Vec::new();
    for entry in read_dir(root)? {
        let label_dir = entry
            .map_err(|source| DoctriageError::InputRead {
                path: root.to_path_buf(),
                source,
            })?
            .path();
        if !label_dir.is_dir() {
            continue;
        }
        let Some(label) = label_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        for file in read_dir(&label_dir)? {
            let path = file
                .map_err(|source| DoctriageError::InputRead {
                    path: label_dir.clone(),
                    source,
                })?
                .path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !detect::allowed(&name) {
                warn!("Skipping '{}': file type not allowed", path.display());
                continue;
            }
            tasks.push(DatasetTask {
                path,
                label: label.clone(),
            });
        }
    }
    tasks.sort();
    Ok(tasks)
}

/// Extract and normalise every allowed file under `root`.
///
/// Files that cannot be read, fail extraction or leave no text after
/// normalisation are logged and left out; only a missing or unreadable
/// `root` is an error.
pub async fn build_dataset(
    root: impl AsRef<Path>,
    options: &DatasetOptions,
) -> Result<Vec<LabelledText>, DoctriageError> {
    let root = root.as_ref();
    let tasks = collect_tasks(root)?;
    let total = tasks.len();
    info!(
        "Building dataset from '{}': {} files, concurrency {}",
        root.display(),
        total,
        options.concurrency
    );
    options.progress.on_start(total);

    let ocr: Arc<dyn OcrEngine> = match &options.ocr {
        Some(ocr) => Arc::clone(ocr),
        None => Arc::new(TesseractOcr::from_config(&options.config)),
    };
    let config = Arc::new(options.config.clone());
    let normalizer = options.normalizer;

    let mut rows: Vec<LabelledText> = stream::iter(tasks.into_iter().map(|task| {
        let ocr = Arc::clone(&ocr);
        let config = Arc::clone(&config);
        let progress = Arc::clone(&options.progress);
        async move {
            process_task(
                task,
                ocr.as_ref(),
                &config,
                normalizer,
                progress.as_ref(),
            )
            .await
        }
    }))
    .buffer_unordered(options.concurrency.max(1))
    .filter_map(|row| async move { row })
    .collect()
    .await;

    rows.sort_by(|a, b| a.path.cmp(&b.path));
    options.progress.on_complete(total, rows.len());
    info!("Dataset built: {} of {} files kept", rows.len(), total);
    Ok(rows)
}

async fn process_task(
    task: DatasetTask,
    ocr: &dyn OcrEngine,
    config: &ClassifierConfig,
    normalizer: NormalizerConfig,
    progress: &dyn DatasetProgressCallback,
) -> Option<LabelledText> {
    let skip = |reason: String| {
        warn!("Skipping '{}': {}", task.path.display(), reason);
        progress.on_file_skipped(&task.path, &reason);
        None
    };

    let doc = match UploadedDocument::from_path(&task.path).await {
        Ok(doc) => doc,
        Err(e) => return skip(e.to_string()),
    };
    let format = match detect::detect(&doc.filename, &doc.bytes) {
        Ok(format) => format,
        Err(e) => return skip(e.to_string()),
    };

    let text = match extract_document(&doc, format, ocr, config).await {
        ExtractionOutcome::Text(text) => text,
        ExtractionOutcome::Empty => return skip("no text extracted".into()),
        ExtractionOutcome::Failed(e) => return skip(e.to_string()),
    };

    let normalized = normalize(&text, &normalizer);
    if normalized.is_empty() {
        return skip("no text left after normalisation".into());
    }

    debug!(
        "'{}' [{}]: {} words",
        task.path.display(),
        task.label,
        normalized.word_count()
    );
    progress.on_file_complete(&task.path, &task.label, normalized.as_str().len());
    Some(LabelledText {
        path: task.path,
        label: task.label,
        text: normalized.into_string(),
    })
}

/// Write `dataset` as pretty JSON `[[text, label], ...]`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn save_dataset(
    dataset: &[LabelledText],
    output_path: impl AsRef<Path>,
) -> Result<(), DoctriageError> {
    let path = output_path.as_ref();
    let write_err = |source: std::io::Error| DoctriageError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let pairs: Vec<(&str, &str)> = dataset
        .iter()
        .map(|row| (row.text.as_str(), row.label.as_str()))
        .collect();
    let json = serde_json::to_string_pretty(&pairs)
        .map_err(|e| DoctriageError::Internal(format!("Failed to serialise dataset: {}", e)))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {} rows to '{}'", dataset.len(), path.display());
    Ok(())
}

/// Number of rows per label.
pub fn dataset_statistics(dataset: &[LabelledText]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in dataset {
        *counts.entry(row.label.clone()).or_insert(0) += 1;
    }
    counts
}
