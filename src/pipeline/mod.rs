//! Pipeline stages for document classification.
//!
//! Each submodule implements exactly one step. The model-side stages
//! (vectorise, predict) live in [`crate::model`].
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ detect ──▶ extract ──────────────────▶ normalize ──▶ model
//! (bytes)   (allow-list) │ pdf    (text layer + OCR)  (shared rules)
//!                        │ image  (OCR)
//!                        │ office (docx / xlsx XML)
//! ```
//!
//! 1. [`input`]     — the uploaded document and its per-call scratch workspace
//! 2. [`detect`]    — extension allow-list, magic-byte corroboration
//! 3. [`extract`]   — per-format routing, timeout, failure-to-value boundary
//! 4. [`pdf`]       — pdfium text layer with raster fallback; `spawn_blocking`
//!    because pdfium is not async-safe
//! 5. [`ocr`]       — tesseract child process behind the [`ocr::OcrEngine`] trait
//! 6. [`office`]    — Word paragraphs and spreadsheet tables
//! 7. [`normalize`] — the one cleanup routine shared with dataset building

pub mod detect;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod ocr;
pub mod office;
pub mod pdf;
