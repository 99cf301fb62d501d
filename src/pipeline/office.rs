//! Office documents: text from `.docx` and `.xlsx` containers.
//!
//! Both formats are ZIP archives of XML parts. Parsing is pull-based
//! (`quick-xml`) over the single part that matters, so even large workbooks
//! never build a DOM.
//!
//! * **docx** — paragraphs of `word/document.xml`, in document order,
//!   joined with `\n`. `w:tab` becomes `\t`, `w:br`/`w:cr` become `\n`.
//! * **xlsx** — every sheet in workbook order, rendered as
//!   `Sheet: <name>` followed by a right-aligned text table of its rows
//!   (the first row acts as the header) and a blank line.

use crate::error::ExtractError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{Cursor, Read, Seek};
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

fn corrupt(e: impl fmt::Display) -> ExtractError {
    ExtractError::CorruptOffice {
        detail: e.to_string(),
    }
}

fn open_archive(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, ExtractError> {
    ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)
}

/// Read a text part of the archive; `None` if the part does not exist.
///
/// At most `limit` decompressed bytes are read. The declared size in the
/// central directory is checked first, but it is attacker-controlled, so the
/// read itself is bounded too.
fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Option<String>, ExtractError> {
    let file = match archive.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(corrupt(e)),
    };
    let too_large = || ExtractError::PartTooLarge {
        part: name.to_string(),
        limit,
    };
    if file.size() > limit {
        return Err(too_large());
    }
    let mut xml = String::new();
    file.take(limit.saturating_add(1))
        .read_to_string(&mut xml)
        .map_err(corrupt)?;
    if xml.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(Some(xml))
}

fn require_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<String, ExtractError> {
    read_part(archive, name, limit)?.ok_or_else(|| ExtractError::CorruptOffice {
        detail: format!("missing part '{}'", name),
    })
}

fn attribute(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>, ExtractError> {
    for attr in e.attributes() {
        let attr = attr.map_err(corrupt)?;
        if attr.key.local_name().as_ref() == local {
            return Ok(Some(attr.unescape_value().map_err(corrupt)?.into_owned()));
        }
    }
    Ok(None)
}

// ── Word ─────────────────────────────────────────────────────────────────────

/// Extract paragraph text from a `.docx` file.
///
/// `max_part_bytes` bounds the decompressed size of every part read.
pub fn extract_docx(bytes: &[u8], max_part_bytes: u64) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = require_part(&mut archive, "word/document.xml", max_part_bytes)?;
    let paragraphs = docx_paragraphs(&xml)?;
    debug!("docx: {} paragraphs", paragraphs.len());
    Ok(paragraphs.join("\n").trim().to_string())
}

/// Paragraph texts of a WordprocessingML body.
///
/// Paragraphs nested in text boxes are emitted as their own paragraphs.
fn docx_paragraphs(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                let current = open.last_mut();
                match (e.local_name().as_ref(), current) {
                    (b"p", _) => paragraphs.push(String::new()),
                    (b"tab", Some(p)) => p.push('\t'),
                    (b"br" | b"cr", Some(p)) => p.push('\n'),
                    _ => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => {
                    if let Some(p) = open.pop() {
                        paragraphs.push(p);
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(p) = open.last_mut() {
                    p.push_str(&t.unescape().map_err(corrupt)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

// ── Spreadsheet ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SheetEntry {
    name: String,
    rel_id: Option<String>,
}

/// Extract every sheet of an `.xlsx` file as a labelled text table.
///
/// `max_part_bytes` bounds the decompressed size of every part read.
pub fn extract_xlsx(bytes: &[u8], max_part_bytes: u64) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let limit = max_part_bytes;

    let shared = match read_part(&mut archive, "xl/sharedStrings.xml", limit)? {
        Some(xml) => shared_strings(&xml)?,
        None => Vec::new(),
    };
    let sheets = workbook_sheets(&require_part(&mut archive, "xl/workbook.xml", limit)?)?;
    let rels = match read_part(&mut archive, "xl/_rels/workbook.xml.rels", limit)? {
        Some(xml) => relationships(&xml)?,
        None => HashMap::new(),
    };

    let mut out = String::new();
    for (index, sheet) in sheets.iter().enumerate() {
        let part = sheet
            .rel_id
            .as_ref()
            .and_then(|id| rels.get(id))
            .map(|target| resolve_target(target))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", index + 1));
        let xml = require_part(&mut archive, &part, limit)?;
        let rows = sheet_rows(&xml, &shared)?;
        debug!("xlsx: sheet '{}' has {} rows", sheet.name, rows.len());

        out.push_str(&format!("Sheet: {}\n", sheet.name));
        out.push_str(&render_table(&rows));
        out.push_str("\n\n");
    }
    Ok(out.trim().to_string())
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn shared_strings(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    // Phonetic runs (`rPh`) repeat the reading of the text; skip them.
    let mut in_phonetic = false;

    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Text(t) if in_text && !in_phonetic => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape().map_err(corrupt)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

fn workbook_sheets(xml: &str) -> Result<Vec<SheetEntry>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(&e, b"name")?
                    .unwrap_or_else(|| format!("Sheet{}", sheets.len() + 1));
                let rel_id = attribute(&e, b"id")?;
                sheets.push(SheetEntry { name, rel_id });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(sheets)
}

fn relationships(xml: &str) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attribute(&e, b"Id")?;
                let target = attribute(&e, b"Target")?;
                if let (Some(id), Some(target)) = (id, target) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

/// Sheet bounds of the xlsx format: columns `A..=XFD`, rows `1..=1048576`.
const MAX_COLUMNS: usize = 16_384;
const MAX_ROWS: usize = 1_048_576;

/// Split an `A1`-style reference into zero-based (row, column).
///
/// `None` for malformed references and for cells outside the sheet bounds.
fn parse_cell_ref(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters.chars().try_fold(0usize, |acc, c| {
        acc.checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as usize - 'A' as usize + 1)
    })?;
    let row: usize = digits.parse().ok()?;
    if col > MAX_COLUMNS || row > MAX_ROWS {
        return None;
    }
    Some((row.checked_sub(1)?, col - 1))
}

fn out_of_range(what: String) -> ExtractError {
    ExtractError::CorruptOffice {
        detail: format!("{} is malformed or outside the sheet bounds", what),
    }
}

#[derive(Default)]
struct CellState {
    reference: Option<(usize, usize)>,
    kind: Option<String>,
    value: String,
}

/// Cell texts of one worksheet, row-major. Fully empty rows are dropped.
fn sheet_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut cells: BTreeMap<(usize, usize), String> = BTreeMap::new();
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut row_index: usize = 0;
    let mut next_col: usize = 0;

    loop {
        match reader.read_event().map_err(corrupt)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    if let Some(r) = attribute(&e, b"r")? {
                        match r.parse::<usize>() {
                            Ok(n) if n > MAX_ROWS => return Err(out_of_range(format!("row {}", n))),
                            Ok(n) => row_index = n.saturating_sub(1),
                            Err(_) => {}
                        }
                    }
                    next_col = 0;
                }
                b"c" => {
                    let reference = match attribute(&e, b"r")? {
                        Some(r) => Some(
                            parse_cell_ref(&r)
                                .ok_or_else(|| out_of_range(format!("cell reference '{}'", r)))?,
                        ),
                        None => None,
                    };
                    cell = Some(CellState {
                        reference,
                        kind: attribute(&e, b"t")?,
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"row" => row_index += 1,
                b"c" => {
                    if let Some(state) = cell.take() {
                        let (r, c) = state.reference.unwrap_or((row_index, next_col));
                        if r >= MAX_ROWS || c >= MAX_COLUMNS {
                            let at = format!("cell at row {}, column {}", r + 1, c + 1);
                            return Err(out_of_range(at));
                        }
                        next_col = c + 1;
                        let text = cell_text(state.kind.as_deref(), &state.value, shared);
                        if !text.is_empty() {
                            cells.insert((r, c), text);
                        }
                    }
                }
                b"v" | b"t" => in_value = false,
                _ => {}
            },
            Event::Text(t) if in_value => {
                if let Some(state) = cell.as_mut() {
                    state.value.push_str(&t.unescape().map_err(corrupt)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let width = cells.keys().map(|(_, c)| c + 1).max().unwrap_or(0);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Option<usize> = None;
    for ((r, c), text) in cells {
        if current_row != Some(r) {
            rows.push(vec![String::new(); width]);
            current_row = Some(r);
        }
        if let Some(last) = rows.last_mut() {
            last[c] = text;
        }
    }
    Ok(rows)
}

fn cell_text(kind: Option<&str>, raw: &str, shared: &[String]) -> String {
    match kind {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
            .cloned()
            .unwrap_or_default(),
        Some("b") => match raw.trim() {
            "1" => "True".to_string(),
            _ => "False".to_string(),
        },
        _ => raw.to_string(),
    }
}

/// Right-aligned, space-separated table; one line per row.
fn render_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut col_widths = vec![0usize; width];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            col_widths[i] = col_widths[i].max(cell.chars().count());
        }
    }
    rows.iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| format!("{:>w$}", cell, w = col_widths[i]))
                .collect::<Vec<_>>()
                .join(" ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
