//! PDF text extraction with a per-page OCR fallback.
//!
//! Each page is first asked for its text layer. Pages whose text layer is
//! empty (scans, photographed receipts, image-only exports) are rendered to a
//! PNG in the document's [`Workspace`] and handed to the OCR engine. Page
//! texts are joined in page order.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! designed for async contexts. All pdfium work happens inside one
//! `tokio::task::spawn_blocking` call that sends plain data (text or the
//! path of a rendered page) back over a bounded channel, one page at a time.
//! OCR runs on the async side as pages arrive, so a slow tesseract never
//! pins a blocking thread.
//!
//! The channel doubles as the cancellation signal: when the extraction
//! future is dropped (timeout, caller gone) the receiver goes with it and
//! the scan stops before the next page. At most a handful of rendered pages
//! exist on disk at any time; each PNG is removed once OCR is done with it.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 300 DPI would produce a
//! 10,000 × 14,000 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded while leaving body
//! text comfortably above the size tesseract needs.

use crate::config::ClassifierConfig;
use crate::error::ExtractError;
use crate::pipeline::input::Workspace;
use crate::pipeline::ocr::OcrEngine;
use image::ImageFormat;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pages scanned ahead of OCR.
const PAGE_BUFFER: usize = 2;

/// What the blocking scan found on one page.
#[derive(Debug, Clone, PartialEq)]
enum PageContent {
    /// The page has a usable text layer.
    Text(String),
    /// The page had no text; it was rendered to this PNG for OCR.
    Raster(PathBuf),
}

type PageResult = Result<PageContent, ExtractError>;

/// Bind to the pdfium shared library.
///
/// Lookup order: `library_path` (a file, or a directory holding the
/// platform-named library), `PDFIUM_LIB_PATH`, the working directory, then
/// the system library search path.
pub fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, ExtractError> {
    let explicit = library_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match explicit {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    };

    bindings
        .map(Pdfium::new)
        .map_err(|e| ExtractError::PdfiumUnavailable {
            detail: format!("{:?}", e),
        })
}

// `Pdfium` is `Send + Sync` with pdfium-render's `sync` feature.
static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

/// The process-wide pdfium instance, bound on first use.
///
/// pdfium is initialised once per process; `library_path` only matters for
/// the first successful call.
pub fn shared_pdfium(library_path: Option<&Path>) -> Result<&'static Pdfium, ExtractError> {
    PDFIUM.get_or_try_init(|| {
        let pdfium = bind_pdfium(library_path)?;
        info!("pdfium bound");
        Ok(pdfium)
    })
}

/// Extract the text of a PDF, OCR-ing pages that have no text layer.
///
/// A page that cannot be rendered or recognised is skipped; the error is
/// only reported when no page produced any text.
pub async fn extract_pdf(
    bytes: Vec<u8>,
    workspace: &Workspace,
    ocr: &dyn OcrEngine,
    config: &ClassifierConfig,
) -> Result<String, ExtractError> {
    let (pages_tx, pages_rx) = mpsc::channel(PAGE_BUFFER);

    // The clone keeps the directory alive for the blocking task even if
    // this future is dropped before the task notices.
    let scratch = workspace.clone();
    let max_pixels = config.max_rendered_pixels;
    let library_path = config.pdfium_library_path.clone();
    let scan = tokio::task::spawn_blocking(move || {
        scan_pages_blocking(
            bytes,
            scratch.path(),
            max_pixels,
            library_path.as_deref(),
            &pages_tx,
        )
    });

    // Drain first: the scan blocks on a full channel.
    let text = assemble_pages(pages_rx, ocr).await;

    let page_count = scan.await.map_err(|e| ExtractError::TaskAborted {
        detail: format!("PDF task panicked: {}", e),
    })??;
    debug!("PDF scan finished: {} pages", page_count);
    text
}

/// Join page texts in page order, OCR-ing rendered pages as they arrive.
async fn assemble_pages(
    mut pages_rx: mpsc::Receiver<PageResult>,
    ocr: &dyn OcrEngine,
) -> Result<String, ExtractError> {
    let mut texts = Vec::new();
    let mut first_error: Option<ExtractError> = None;
    let mut page_count = 0usize;
    let mut ocr_pages = 0usize;

    while let Some(page) = pages_rx.recv().await {
        page_count += 1;
        let page_text = match page {
            Ok(PageContent::Text(text)) => Ok(text),
            Ok(PageContent::Raster(path)) => {
                ocr_pages += 1;
                let result = ocr.recognize(&path).await;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!("Could not remove {}: {}", path.display(), e);
                }
                result
            }
            Err(e) => Err(e),
        };
        match page_text {
            Ok(text) => texts.push(text),
            Err(e) => {
                warn!("Page {}: skipped: {}", page_count, e);
                first_error.get_or_insert(e);
            }
        }
    }

    let text = texts.join("\n").trim().to_string();
    info!(
        "PDF: {} pages, {} via {} fallback, {} chars",
        page_count,
        ocr_pages,
        ocr.name(),
        text.len()
    );

    // Partial failure still yields the text we have; total failure with
    // nothing to show is reported.
    match first_error {
        Some(e) if text.is_empty() => Err(e),
        _ => Ok(text),
    }
}

fn abandoned(page: usize, total: usize) -> ExtractError {
    debug!("PDF scan abandoned at page {} of {}", page, total);
    ExtractError::TaskAborted {
        detail: format!("PDF scan abandoned at page {}", page),
    }
}

/// Blocking implementation of the page scan.
///
/// Sends one [`PageResult`] per page and returns the page count. Stops as
/// soon as the receiving side is gone.
fn scan_pages_blocking(
    bytes: Vec<u8>,
    scratch: &Path,
    max_pixels: u32,
    library_path: Option<&Path>,
    pages_tx: &mpsc::Sender<PageResult>,
) -> Result<usize, ExtractError> {
    let pdfium = shared_pdfium(library_path)?;

    let document = pdfium.load_pdf_from_byte_vec(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            ExtractError::Encrypted
        } else {
            ExtractError::CorruptPdf { detail: err_str }
        }
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    debug!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    for (idx, page) in pages.iter().enumerate() {
        if pages_tx.is_closed() {
            return Err(abandoned(idx + 1, total));
        }
        let content = scan_page(&page, idx + 1, scratch, &render_config);
        if pages_tx.blocking_send(content).is_err() {
            return Err(abandoned(idx + 1, total));
        }
    }

    Ok(total)
}

/// Text layer of one page, or a PNG of it when the layer is empty.
fn scan_page(
    page: &PdfPage<'_>,
    number: usize,
    scratch: &Path,
    render_config: &PdfRenderConfig,
) -> PageResult {
    let text = match page.text() {
        Ok(t) => t.all(),
        Err(e) => {
            debug!("Page {}: no text layer ({:?})", number, e);
            String::new()
        }
    };

    if !text.trim().is_empty() {
        return Ok(PageContent::Text(text));
    }

    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| ExtractError::RenderFailed {
            page: number,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    let path = scratch.join(format!("page-{:04}.png", number));
    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| ExtractError::RenderFailed {
            page: number,
            detail: e.to_string(),
        })?;
    debug!(
        "Page {} has no text layer, rendered {}x{} px for OCR",
        number,
        image.width(),
        image.height()
    );

    Ok(PageContent::Raster(path))
}
