//! Progress-callback trait for dataset building.
//!
//! Inject an [`Arc<dyn DatasetProgressCallback>`] via
//! [`crate::dataset::DatasetOptions::progress`] to receive events as files
//! are extracted.
//!
//! # Example
//!
//! ```rust
//! use doctriage::{DatasetOptions, DatasetProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl DatasetProgressCallback for Counter {
//!     fn on_file_complete(&self, _path: &Path, _label: &str, _text_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let options = DatasetOptions::default()
//!     .with_progress(Arc::new(Counter(AtomicUsize::new(0))));
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::dataset::build_dataset`] as it works through files.
///
/// Files are processed concurrently, so every method may be called from
/// several threads at once. All methods default to no-ops.
pub trait DatasetProgressCallback: Send + Sync {
    /// Called once, before any file is read.
    ///
    /// # Arguments
    /// * `total_files` — number of allowed files found under the root
    fn on_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file produced text and was kept.
    ///
    /// # Arguments
    /// * `path`     — the file
    /// * `label`    — its directory label
    /// * `text_len` — bytes of normalised text kept
    fn on_file_complete(&self, path: &Path, label: &str, text_len: usize) {
        let _ = (path, label, text_len);
    }

    /// Called when a file was dropped (unreadable or no text).
    fn on_file_skipped(&self, path: &Path, reason: &str) {
        let _ = (path, reason);
    }

    /// Called once after every file has been attempted.
    ///
    /// # Arguments
    /// * `total_files` — files attempted
    /// * `kept`        — files that made it into the dataset
    fn on_complete(&self, total_files: usize, kept: usize) {
        let _ = (total_files, kept);
    }
}

/// The default callback: ignores every event.
pub struct NoopProgressCallback;

impl DatasetProgressCallback for NoopProgressCallback {}

/// Shared callback handle stored in [`crate::dataset::DatasetOptions`].
pub type ProgressCallback = Arc<dyn DatasetProgressCallback>;
