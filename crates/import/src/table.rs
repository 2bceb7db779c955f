use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;

use calamine::{Data, Reader};
use encoding_rs::{Encoding, EUC_JP, SHIFT_JIS, UTF_8};

use crate::error::{ImportError, Result};

/// A header row must contain at least one of these to be accepted.
pub const HEADER_KEYWORDS: [&str; 5] = ["銀行名", "日付", "年月日", "支店名", "摘要"];

/// Label reported for the lossy last-resort decode.
pub const LOSSY_FALLBACK: &str = "cp932-replace";

const SPREADSHEET_SOURCE: &str = "spreadsheet";
const HEAD_BYTES: usize = 32;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// ZIP container (xlsx/ods) or OLE2 compound document (xls).
const BINARY_SIGNATURES: [&[u8]; 2] = [b"PK\x03\x04", &[0xD0, 0xCF, 0x11, 0xE0]];

/// One text encoding attempted for non-binary input, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8Sig,
    Utf8,
    Cp932,
    EucJp,
}

impl TextEncoding {
    pub const ORDER: [TextEncoding; 4] = [
        TextEncoding::Utf8Sig,
        TextEncoding::Utf8,
        TextEncoding::Cp932,
        TextEncoding::EucJp,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8Sig => "utf-8-sig",
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Cp932 => "cp932",
            TextEncoding::EucJp => "euc-jp",
        }
    }

    fn codec(self) -> &'static Encoding {
        match self {
            TextEncoding::Utf8Sig | TextEncoding::Utf8 => UTF_8,
            TextEncoding::Cp932 => SHIFT_JIS,
            TextEncoding::EucJp => EUC_JP,
        }
    }

    /// Strict decode; `None` on any malformed sequence. `Utf8Sig` only
    /// applies when the byte-order mark is present.
    pub fn decode(self, bytes: &[u8]) -> Option<Cow<'_, str>> {
        let bytes = match self {
            TextEncoding::Utf8Sig => bytes.strip_prefix(UTF8_BOM)?,
            _ => bytes,
        };
        self.codec()
            .decode_without_bom_handling_and_without_replacement(bytes)
    }
}

/// A raw cell as read from the source, before any coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn from_text(s: &str) -> Self {
        if s.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(n) => n.is_nan(),
        }
    }

    /// Trimmed text form; whole numbers print without a fractional part so
    /// numeric account numbers read the same as their text form.
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Cell::Number(n) if n.is_nan() => None,
            Cell::Number(n) => Some(format_number(*n)),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Number(n) => write!(f, "{}", format_number(*n)),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Physical 1-indexed line (or spreadsheet row) in the source.
    pub line: usize,
    pub cells: Vec<Cell>,
}

impl RawRow {
    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&Cell::Empty)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }
}

/// Tabular source with its header row located.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Encoding label, [`LOSSY_FALLBACK`], or `spreadsheet`.
    pub source: String,
}

fn headers_recognized(headers: &[String]) -> bool {
    headers
        .iter()
        .any(|h| HEADER_KEYWORDS.iter().any(|kw| h.contains(kw)))
}

pub fn is_binary_spreadsheet(bytes: &[u8]) -> bool {
    BINARY_SIGNATURES.iter().any(|sig| bytes.starts_with(sig))
}

/// Detects the container and encoding of a statement file and locates its header.
pub fn read_statement(bytes: &[u8]) -> Result<RawTable> {
    if is_binary_spreadsheet(bytes) {
        return read_spreadsheet(bytes);
    }

    let mut tried = Vec::new();
    for encoding in TextEncoding::ORDER {
        tried.push(encoding.label().to_string());
        let Some(text) = encoding.decode(bytes) else {
            tracing::debug!("{} cannot decode statement", encoding.label());
            continue;
        };
        if let Some(table) = parse_delimited(&text, encoding.label()) {
            tracing::info!("Statement decoded as {}", encoding.label());
            return Ok(table);
        }
    }

    tried.push(LOSSY_FALLBACK.to_string());
    let (text, had_errors) = SHIFT_JIS.decode_without_bom_handling(bytes);
    if let Some(table) = parse_delimited(&text, LOSSY_FALLBACK) {
        tracing::warn!(
            "Statement decoded with replacement characters (lossy: {had_errors})"
        );
        return Ok(table);
    }

    Err(ImportError::Encoding {
        tried_encodings: tried,
        file_head_hex: head_hex(bytes),
    })
}

fn head_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(HEAD_BYTES)
        .map(|b| format!("{b:02X}"))
        .collect()
}

/// Parses decoded text, trying the header on line 0 then line 1.
/// `None` when neither candidate carries a header keyword.
fn parse_delimited(text: &str, source: &str) -> Option<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    // The reader neither counts skipped blank lines nor excludes them from a
    // record's start offset, so lines are recovered from the text itself.
    let bytes = text.as_bytes();
    let newlines: Vec<usize> = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .map(|(i, _)| i)
        .collect();
    let physical_line = |offset: usize| {
        let start = bytes
            .get(offset..)
            .and_then(|rest| rest.iter().position(|b| !matches!(b, b'\r' | b'\n')))
            .map_or(offset, |skip| offset + skip);
        newlines.partition_point(|&n| n < start) + 1
    };

    let mut records: Vec<RawRow> = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("{source}: stopped reading at malformed record: {e}");
                return None;
            }
        };
        let line = record
            .position()
            .map(|p| physical_line(p.byte() as usize))
            .unwrap_or(records.len() + 1);
        records.push(RawRow {
            line,
            cells: record.iter().map(Cell::from_text).collect(),
        });
    }

    locate_header(records, source)
}

/// Picks row 0 as header, or row 1 when a title line precedes it.
fn locate_header(mut records: Vec<RawRow>, source: &str) -> Option<RawTable> {
    for offset in 0..2 {
        let Some(candidate) = records.get(offset) else {
            break;
        };
        let headers: Vec<String> = candidate
            .cells
            .iter()
            .map(|c| c.text().unwrap_or_default())
            .collect();
        if headers_recognized(&headers) {
            if offset > 0 {
                tracing::info!("{source}: header found on row {offset}");
            }
            let rows = records.split_off(offset + 1);
            return Some(RawTable {
                headers,
                rows,
                source: source.to_string(),
            });
        }
    }
    None
}

fn read_spreadsheet(bytes: &[u8]) -> Result<RawTable> {
    let unreadable = || ImportError::Encoding {
        tried_encodings: vec![SPREADSHEET_SOURCE.to_string()],
        file_head_hex: head_hex(bytes),
    };

    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| {
            tracing::warn!("Failed to open spreadsheet: {e}");
            unreadable()
        })?;
    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => {
            tracing::warn!("Failed to read first worksheet: {e}");
            return Err(unreadable());
        }
        None => return Err(unreadable()),
    };

    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let records: Vec<RawRow> = range
        .rows()
        .enumerate()
        .map(|(i, row)| RawRow {
            line: first_row + i + 1,
            cells: row.iter().map(spreadsheet_cell).collect(),
        })
        .collect();

    match locate_header(records.clone(), SPREADSHEET_SOURCE) {
        Some(table) => Ok(table),
        // Binary input is never re-decoded; let column mapping report what was found.
        None => {
            let mut records = records;
            let headers = if records.is_empty() {
                Vec::new()
            } else {
                records
                    .remove(0)
                    .cells
                    .iter()
                    .map(|c| c.text().unwrap_or_default())
                    .collect()
            };
            Ok(RawTable {
                headers,
                rows: records,
                source: SPREADSHEET_SOURCE.to_string(),
            })
        }
    }
}

fn spreadsheet_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::from_text(s),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(Cell::Text)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from_text(s),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

/// Excel day serial to ISO date (epoch 1899-12-30 absorbs the 1900 leap-year bug).
pub fn excel_serial_to_date(serial: f64) -> Option<String> {
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(chrono::Duration::days(serial.trunc() as i64))?;
    Some(date.format("%Y-%m-%d").to_string())
}
