//! End-to-end tests for doctriage.
//!
//! Documents are built inside each test (PDFs through pdfium, Word and Excel
//! files as in-memory zips, images through the `image` crate) and classified
//! with the sample artifact in `fixtures/model.json`.
//!
//! Tests that need pdfium or the tesseract executable print `SKIP` and
//! return when those are not installed.
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use doctriage::pipeline::pdf::shared_pdfium;
use doctriage::{
    allowed, extract_text, normalize, ClassificationResult, Classifier, ClassifierConfig,
    ErrorKind, ExtractError, ExtractionOutcome, ModelArtifact, NormalizerConfig, OcrEngine,
    Outcome, Stage, TesseractOcr, UnknownReason, UploadedDocument,
};
use pdfium_render::prelude::*;
use regex::Regex;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use zip::write::SimpleFileOptions;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=doctriage=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fixture_model() -> Arc<ModelArtifact> {
    init_tracing();
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/model.json");
    Arc::new(ModelArtifact::load(path).expect("fixture model must load"))
}

fn classifier_with(ocr: Arc<dyn OcrEngine>) -> Classifier {
    Classifier::new(fixture_model(), ClassifierConfig::default()).with_ocr_engine(ocr)
}

/// Skip this test if pdfium cannot be loaded.
macro_rules! pdfium_or_skip {
    () => {
        match shared_pdfium(None) {
            Ok(p) => p,
            Err(e) => {
                println!("SKIP — pdfium not available: {e}");
                return;
            }
        }
    };
}

/// Skip this test if the tesseract executable is not on PATH.
macro_rules! tesseract_or_skip {
    () => {{
        let ocr = TesseractOcr::from_config(&ClassifierConfig::default());
        if !ocr.is_available() {
            println!("SKIP — tesseract not installed");
            return;
        }
        ocr
    }};
}

/// OCR stub returning fixed text, counting calls.
struct FixedOcr {
    text: &'static str,
    calls: AtomicUsize,
}

impl FixedOcr {
    fn new(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            text,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OcrEngine for FixedOcr {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn recognize(&self, image_path: &Path) -> Result<String, ExtractError> {
        assert!(image_path.exists(), "OCR input must exist on disk");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.to_string())
    }
}

/// OCR stub that never finishes in time.
struct StuckOcr;

#[async_trait]
impl OcrEngine for StuckOcr {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn recognize(&self, _image_path: &Path) -> Result<String, ExtractError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// Build a PDF whose pages carry the given texts (`None` = blank page).
fn make_pdf(pdfium: &Pdfium, pages: &[Option<&str>], font_size: f32) -> Vec<u8> {
    let mut document = pdfium.create_new_pdf().unwrap();
    let font = document.fonts_mut().helvetica();
    for text in pages {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
        if let Some(text) = text {
            page.objects_mut()
                .create_text_object(
                    PdfPoints::new(60.0),
                    PdfPoints::new(700.0),
                    *text,
                    font,
                    PdfPoints::new(font_size),
                )
                .unwrap();
        }
    }
    document.save_to_bytes().unwrap()
}

/// Render the first page of `pdf` to a PNG at `out`.
fn render_png(pdfium: &Pdfium, pdf: Vec<u8>, out: &Path) {
    let document = pdfium.load_pdf_from_byte_vec(pdf, None).unwrap();
    let page = document.pages().get(0).unwrap();
    let bitmap = page
        .render_with_config(&PdfRenderConfig::new().set_target_width(1600))
        .unwrap();
    bitmap
        .as_image()
        .save_with_format(out, image::ImageFormat::Png)
        .unwrap();
}

fn zip_of(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    zip_of(&[("word/document.xml", &xml)])
}

/// Two columns, two data rows, no workbook relationships (sheet1 fallback).
fn text_xlsx() -> Vec<u8> {
    let workbook = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
    let shared = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="4">
<si><t>A</t></si><si><t>B</t></si><si><t>Text1</t></si><si><t>Text2</t></si></sst>"#;
    let sheet = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2"><v>1</v></c><c r="B2" t="s"><v>2</v></c></row>
<row r="3"><c r="A3"><v>2</v></c><c r="B3" t="s"><v>3</v></c></row>
</sheetData></worksheet>"#;
    zip_of(&[
        ("xl/workbook.xml", workbook),
        ("xl/sharedStrings.xml", shared),
        ("xl/worksheets/sheet1.xml", sheet),
    ])
}

fn blank_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(320, 200, image::Rgb([255, 255, 255]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn assert_top_class(result: &ClassificationResult, label: &str) {
    assert_eq!(result.file_class, label, "result: {result:#?}");
    let top = result.probability_of(label).unwrap();
    for p in &result.probabilities {
        if p.label != label {
            assert!(
                p.probability < top,
                "{} ({}) is not below {} ({})",
                p.label,
                p.probability,
                label,
                top
            );
        }
    }
}

// ── Format allow-list ────────────────────────────────────────────────────────

#[test]
fn allow_list_truth_table() {
    for name in [
        "file.pdf",
        "file.png",
        "file.jpg",
        "file.docx",
        "file.xlsx",
        "FILE.PDF",
        "Scan.JpG",
    ] {
        assert!(allowed(name), "{name} should be allowed");
    }
    for name in ["file.txt", "file", "", "file.jpeg", "file.doc", "pdf", "file.pdf.exe"] {
        assert!(!allowed(name), "{name:?} should be rejected");
    }
}

#[tokio::test]
async fn unsupported_upload_never_reaches_an_extractor() {
    let ocr = FixedOcr::new("invoice total due");
    let classifier = classifier_with(ocr.clone());

    let result = classifier
        .classify(UploadedDocument::new("file.txt", b"Invoice total due".to_vec()))
        .await;

    assert_eq!(result.file_class, "error");
    assert_eq!(result.error_code(), Some(ErrorKind::UnsupportedFormat));
    assert!(matches!(
        result.outcome,
        Outcome::Failed {
            stage: Stage::Received,
            ..
        }
    ));
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["outcome"]["error"], "unsupported_format");
}

// ── PDF ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_text_layer_is_extracted() {
    let pdfium = pdfium_or_skip!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.pdf");
    std::fs::write(&path, make_pdf(pdfium, &[Some("Sample Text")], 14.0)).unwrap();

    let outcome = extract_text(&path, &ClassifierConfig::default())
        .await
        .unwrap();
    let ExtractionOutcome::Text(text) = outcome else {
        panic!("expected text, got {outcome:?}");
    };
    assert_eq!(
        normalize(&text, &NormalizerConfig::default()).as_str(),
        "Sample Text"
    );
}

#[tokio::test]
async fn scanned_pdf_page_falls_back_to_ocr() {
    let pdfium = pdfium_or_skip!();
    let pdf = make_pdf(pdfium, &[Some("Account statement"), None], 14.0);

    let ocr = FixedOcr::new("Bank balance deposit withdrawal");
    let classifier = classifier_with(ocr.clone());
    let result = classifier
        .classify(UploadedDocument::new("statement.pdf", pdf))
        .await;

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    assert_top_class(&result, "bank_statement");
}

#[tokio::test]
async fn corrupt_pdf_is_unknown_not_error() {
    let _pdfium = pdfium_or_skip!();
    let classifier = classifier_with(FixedOcr::new(""));
    let result = classifier
        .classify(UploadedDocument::new(
            "broken.pdf",
            b"%PDF-1.7\ngarbage".to_vec(),
        ))
        .await;
    assert_eq!(
        result.outcome,
        Outcome::Unknown {
            reason: UnknownReason::ExtractionFailed
        }
    );
    assert!(matches!(
        result.extraction_error,
        Some(ExtractError::CorruptPdf { .. })
    ));
}

// ── Images ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_hello_world_is_ocred() {
    let pdfium = pdfium_or_skip!();
    let _tesseract = tesseract_or_skip!();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.png");
    render_png(pdfium, make_pdf(pdfium, &[Some("Hello World")], 48.0), &path);

    let outcome = extract_text(&path, &ClassifierConfig::default())
        .await
        .unwrap();
    let re = Regex::new(r"(?i)hello\s*world").unwrap();
    assert!(re.is_match(outcome.text()), "OCR gave: {outcome:?}");
}

#[tokio::test]
async fn blank_image_is_unknown_without_raising() {
    let ocr = FixedOcr::new("");
    let classifier = classifier_with(ocr.clone());
    let result = classifier
        .classify(UploadedDocument::new("blank.png", blank_png()))
        .await;

    assert_eq!(
        result.outcome,
        Outcome::Unknown {
            reason: UnknownReason::NoText
        }
    );
    assert!(result.probabilities.is_empty());
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blank_image_with_real_tesseract() {
    let tesseract = tesseract_or_skip!();
    let classifier = classifier_with(Arc::new(tesseract));
    let result = classifier
        .classify(UploadedDocument::new("blank.png", blank_png()))
        .await;
    assert_eq!(result.file_class, "unknown", "result: {result:#?}");
}

// ── Office ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn xlsx_cells_are_extracted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.xlsx");
    std::fs::write(&path, text_xlsx()).unwrap();

    let outcome = extract_text(&path, &ClassifierConfig::default())
        .await
        .unwrap();
    let text = outcome.text();
    assert!(text.contains("Text1"), "got: {text}");
    assert!(text.contains("Text2"), "got: {text}");
}

#[tokio::test]
async fn invoice_docx_is_classified_as_invoice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("invoice.docx");
    std::fs::write(
        &path,
        docx(&[
            "ACME Supplies Ltd.",
            "INVOICE NUMBER: 2024-0113",
            "Date: 12 March 2024",
            "Quantity  Price  Amount",
            "Total amount due: $1,250.00 (tax included)",
            "Payment due within 30 days.",
        ]),
    )
    .unwrap();

    let result = classifier_with(FixedOcr::new(""))
        .classify_path(&path)
        .await
        .unwrap();
    assert_eq!(result.filename, "invoice.docx");
    assert_top_class(&result, "invoice");
    let sum: f64 = result.probabilities.iter().map(|p| p.probability).sum();
    assert!((sum - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn docx_without_known_terms_is_unknown() {
    let classifier = classifier_with(FixedOcr::new(""));
    let result = classifier
        .classify(UploadedDocument::new(
            "poem.docx",
            docx(&["Shall I compare thee", "to a summer's day?"]),
        ))
        .await;
    assert_eq!(
        result.outcome,
        Outcome::Unknown {
            reason: UnknownReason::NoRecognizedTerms
        }
    );
    assert_eq!(result.probabilities.len(), 3);
}

// ── Resource handling ────────────────────────────────────────────────────────

#[tokio::test]
async fn timeout_resolves_unknown_and_removes_scratch() {
    let scratch = tempfile::tempdir().unwrap();
    let config = ClassifierConfig::builder()
        .temp_dir(scratch.path())
        .extraction_timeout_secs(1)
        .build()
        .unwrap();
    let classifier = Classifier::new(fixture_model(), config).with_ocr_engine(Arc::new(StuckOcr));

    let result = classifier
        .classify(UploadedDocument::new("scan.png", blank_png()))
        .await;
    assert_eq!(result.error_code(), Some(ErrorKind::ExtractionFailed));
    assert_eq!(
        result.extraction_error,
        Some(ExtractError::Timeout { secs: 1 })
    );
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn timed_out_pdf_scan_stops_and_removes_scratch() {
    let pdfium = pdfium_or_skip!();
    let blank_pages = vec![None; 300];
    let pdf = make_pdf(pdfium, &blank_pages, 14.0);

    let scratch = tempfile::tempdir().unwrap();
    let config = ClassifierConfig::builder()
        .temp_dir(scratch.path())
        .extraction_timeout_secs(1)
        .build()
        .unwrap();
    let classifier = Classifier::new(fixture_model(), config).with_ocr_engine(Arc::new(StuckOcr));

    let result = classifier
        .classify(UploadedDocument::new("scan.pdf", pdf))
        .await;
    assert_eq!(
        result.extraction_error,
        Some(ExtractError::Timeout { secs: 1 })
    );

    // The blocking scan notices the dropped receiver within one page.
    let deadline = Instant::now() + Duration::from_secs(5);
    while std::fs::read_dir(scratch.path()).unwrap().count() > 0 {
        assert!(
            Instant::now() < deadline,
            "scratch directory still present after the timeout"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn cancelled_classification_removes_scratch() {
    let scratch = tempfile::tempdir().unwrap();
    let config = ClassifierConfig::builder()
        .temp_dir(scratch.path())
        .build()
        .unwrap();
    let classifier = Classifier::new(fixture_model(), config).with_ocr_engine(Arc::new(StuckOcr));

    let doc = UploadedDocument::new("scan.png", blank_png());
    let cancelled =
        tokio::time::timeout(Duration::from_millis(200), classifier.classify(doc)).await;
    assert!(cancelled.is_err(), "classification should still be running");
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn oversize_upload_is_unknown() {
    let config = ClassifierConfig::builder()
        .max_upload_bytes(16)
        .build()
        .unwrap();
    let ocr = FixedOcr::new("invoice");
    let classifier = Classifier::new(fixture_model(), config).with_ocr_engine(ocr.clone());
    let result = classifier
        .classify(UploadedDocument::new("big.png", blank_png()))
        .await;
    assert!(matches!(
        result.extraction_error,
        Some(ExtractError::TooLarge { limit: 16, .. })
    ));
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_requests_are_independent() {
    let classifier = classifier_with(FixedOcr::new("driver license dmv class issued"));
    let mut handles = Vec::new();
    for i in 0..6 {
        let classifier = classifier.clone();
        handles.push(tokio::spawn(async move {
            let doc = if i % 2 == 0 {
                UploadedDocument::new(format!("id-{i}.png"), blank_png())
            } else {
                UploadedDocument::new(
                    format!("inv-{i}.docx"),
                    docx(&["Invoice total amount due", "Payment"]),
                )
            };
            classifier.classify(doc).await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        let expected = if i % 2 == 0 { "drivers_license" } else { "invoice" };
        assert_top_class(&result, expected);
    }
}

#[test]
fn sync_wrapper_classifies_outside_a_runtime() {
    let classifier = classifier_with(FixedOcr::new(""));
    let result = classifier
        .classify_sync(UploadedDocument::new(
            "letter.docx",
            docx(&["Your bank account statement", "Closing balance"]),
        ))
        .unwrap();
    assert_top_class(&result, "bank_statement");
}
