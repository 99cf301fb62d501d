//! Input handling: the uploaded document and its scratch workspace.
//!
//! ## Why a per-document scratch directory?
//!
//! pdfium renders pages to bitmaps that tesseract can only read from disk,
//! and tesseract itself wants an image path. Each classification call gets
//! its own uniquely named [`TempDir`], so concurrent requests never see each
//! other's files, and the directory disappears when the last holder drops
//! it: on success, on failure, on timeout and when the caller cancels the
//! future mid-flight.

use crate::error::{DoctriageError, ExtractError};
use crate::pipeline::detect;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

/// Raw bytes of one upload plus the filename the client declared.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a document from disk; the filename is the path's final component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, DoctriageError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DoctriageError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DoctriageError::InputRead {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { filename, bytes })
    }

    /// Lowercase extension of the declared filename, if any.
    pub fn extension(&self) -> Option<String> {
        detect::extension(&self.filename)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// A uniquely named scratch directory owned by one classification call.
///
/// Cloning shares the same directory; it is removed when the last clone is
/// dropped. Blocking tasks that write into it hold a clone, so the directory
/// outlives them even if the async caller has already given up.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: Arc<TempDir>,
}

impl Workspace {
    /// Create a fresh directory under `parent` (or the system temp dir).
    pub fn create(parent: Option<&Path>) -> Result<Self, ExtractError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("doctriage-");
        let dir = match parent {
            Some(p) => builder.tempdir_in(p),
            None => builder.tempdir(),
        }
        .map_err(|e| ExtractError::TempStorage {
            detail: e.to_string(),
        })?;
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the upload into the workspace under a fixed name.
    ///
    /// The client's filename is never used on disk; only the extension is
    /// kept so external tools can recognise the format.
    pub async fn materialize(&self, extension: &str, bytes: &[u8]) -> Result<PathBuf, ExtractError> {
        let path = self.dir.path().join(format!("upload.{}", extension));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ExtractError::TempStorage {
                detail: format!("Failed to write temp file: {}", e),
            })?;
        Ok(path)
    }
}
