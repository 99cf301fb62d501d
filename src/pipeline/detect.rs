//! Format detection: decide which extraction branch handles an upload.
//!
//! The declared extension is authoritative. It is checked against a fixed
//! allow-list before a single byte of the document is parsed, so an
//! unsupported upload never reaches pdfium, tesseract or the zip reader.
//!
//! ## Why sniff magic bytes at all?
//!
//! A renamed file (`scan.pdf` that is really a JPEG) still fails later inside
//! the extractor, which turns it into an `unknown` result. Sniffing up front
//! lets us log the mismatch with the filename while the cause is obvious,
//! instead of surfacing a cryptic pdfium error. It never changes the decision.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Extensions accepted for classification, lowercase, without the dot.
///
/// Only `jpg` is accepted; `.jpeg` uploads are rejected.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["pdf", "png", "jpg", "docx", "xlsx"];

/// Raster image flavours accepted by the OCR branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Png,
    Jpeg,
}

/// The handling branch for an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Image(ImageKind),
    Word,
    Spreadsheet,
}

impl DocumentFormat {
    /// Canonical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Image(ImageKind::Png) => "png",
            DocumentFormat::Image(ImageKind::Jpeg) => "jpg",
            DocumentFormat::Word => "docx",
            DocumentFormat::Spreadsheet => "xlsx",
        }
    }

    /// Whether extraction needs the bytes materialised in a scratch directory.
    pub fn needs_scratch(&self) -> bool {
        matches!(self, DocumentFormat::Pdf | DocumentFormat::Image(_))
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(DocumentFormat::Pdf),
            "png" => Some(DocumentFormat::Image(ImageKind::Png)),
            "jpg" => Some(DocumentFormat::Image(ImageKind::Jpeg)),
            "docx" => Some(DocumentFormat::Word),
            "xlsx" => Some(DocumentFormat::Spreadsheet),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Image(ImageKind::Png) => "PNG image",
            DocumentFormat::Image(ImageKind::Jpeg) => "JPEG image",
            DocumentFormat::Word => "Word document",
            DocumentFormat::Spreadsheet => "spreadsheet",
        };
        f.write_str(name)
    }
}

/// Why an upload was rejected before extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectError {
    /// The filename has no `.` at all.
    #[error("File type not allowed: '{filename}' has no extension")]
    MissingExtension { filename: String },

    /// The extension is not on the allow-list.
    #[error("File type not allowed: '.{extension}' (accepted: pdf, png, jpg, docx, xlsx)")]
    NotAllowed { filename: String, extension: String },
}

/// Container signature recognised from the first bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Pdf,
    Png,
    Jpeg,
    Zip,
}

/// The lowercase text after the last `.` of `filename`, if there is a dot.
///
/// `"report.PDF"` → `Some("pdf")`, `"archive.tar.gz"` → `Some("gz")`,
/// `"README"` → `None`, `"file."` → `Some("")`.
pub fn extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// True iff `filename` carries an allowed extension (case-insensitive).
pub fn allowed(filename: &str) -> bool {
    extension(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Identify the container type from leading magic bytes.
pub fn sniff(bytes: &[u8]) -> Option<Signature> {
    if bytes.starts_with(b"%PDF") {
        Some(Signature::Pdf)
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(Signature::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(Signature::Jpeg)
    } else if bytes.starts_with(b"PK\x03\x04") {
        Some(Signature::Zip)
    } else {
        None
    }
}

fn expected_signature(format: DocumentFormat) -> Signature {
    match format {
        DocumentFormat::Pdf => Signature::Pdf,
        DocumentFormat::Image(ImageKind::Png) => Signature::Png,
        DocumentFormat::Image(ImageKind::Jpeg) => Signature::Jpeg,
        DocumentFormat::Word | DocumentFormat::Spreadsheet => Signature::Zip,
    }
}

/// Decide the handling branch for an upload.
///
/// The extension alone decides acceptance. The content signature is compared
/// against it and a mismatch is logged, nothing more.
pub fn detect(filename: &str, bytes: &[u8]) -> Result<DocumentFormat, DetectError> {
    let ext = extension(filename).ok_or_else(|| DetectError::MissingExtension {
        filename: filename.to_string(),
    })?;

    let format = DocumentFormat::from_extension(&ext).ok_or_else(|| DetectError::NotAllowed {
        filename: filename.to_string(),
        extension: ext.clone(),
    })?;

    let expected = expected_signature(format);
    match sniff(bytes) {
        Some(found) if found == expected => {
            debug!("'{}' detected as {}", filename, format);
        }
        found => {
            warn!(
                "'{}' declares {} but content signature is {:?}; extracting as declared",
                filename, format, found
            );
        }
    }

    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_truth_table() {
        for name in ["a.pdf", "a.png", "a.jpg", "a.docx", "a.xlsx"] {
            assert!(allowed(name), "{name} should be allowed");
        }
        for name in ["A.PDF", "scan.Png", "photo.JPG", "Letter.DocX", "book.XLSX"] {
            assert!(allowed(name), "{name} should be allowed");
        }
        for name in ["file.txt", "file", "photo.jpeg", "doc.doc", "sheet.xls", "file.", ""] {
            assert!(!allowed(name), "{name} should be rejected");
        }
    }

    #[test]
    fn extension_uses_last_dot() {
        assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("Report.Final.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension("README"), None);
        assert_eq!(extension(".pdf").as_deref(), Some("pdf"));
    }

    #[test]
    fn detect_maps_extensions_to_formats() {
        assert_eq!(detect("x.pdf", b"%PDF-1.7").unwrap(), DocumentFormat::Pdf);
        assert_eq!(
            detect("x.jpg", &[0xFF, 0xD8, 0xFF, 0xE0]).unwrap(),
            DocumentFormat::Image(ImageKind::Jpeg)
        );
        assert_eq!(detect("x.docx", b"PK\x03\x04").unwrap(), DocumentFormat::Word);
        assert_eq!(
            detect("x.xlsx", b"PK\x03\x04").unwrap(),
            DocumentFormat::Spreadsheet
        );
    }

    #[test]
    fn detect_rejects_before_looking_at_content() {
        let err = detect("notes.txt", b"%PDF-1.4").unwrap_err();
        assert_eq!(
            err,
            DetectError::NotAllowed {
                filename: "notes.txt".into(),
                extension: "txt".into()
            }
        );
        assert!(matches!(
            detect("noext", b"%PDF").unwrap_err(),
            DetectError::MissingExtension { .. }
        ));
    }

    #[test]
    fn mismatched_signature_does_not_override_extension() {
        // A PNG renamed to .pdf is still routed to the PDF branch.
        let png = b"\x89PNG\r\n\x1a\n....";
        assert_eq!(detect("scan.pdf", png).unwrap(), DocumentFormat::Pdf);
        assert_eq!(sniff(png), Some(Signature::Png));
        assert_eq!(sniff(b"hello"), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn only_pdf_and_images_need_scratch() {
        assert!(DocumentFormat::Pdf.needs_scratch());
        assert!(DocumentFormat::Image(ImageKind::Png).needs_scratch());
        assert!(!DocumentFormat::Word.needs_scratch());
        assert!(!DocumentFormat::Spreadsheet.needs_scratch());
    }
}
