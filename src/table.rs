use crate::error::FetchError;
use csv::ReaderBuilder;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// A single decoded cell.
///
/// Numbers keep the trimmed text they were written as, so `007` or `1.50`
/// display and export unchanged; the parsed value is only used for ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64, String),
    Text(String),
}

impl CellValue {
    /// Classify a raw CSV field.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n, trimmed.to_string()),
            _ => CellValue::Text(raw.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Ordering used by the sort stage: numbers ascending, then text, then
    /// empties last.
    pub fn sort_cmp(&self, other: &CellValue) -> Ordering {
        use CellValue::*;
        match (self, other) {
            (Number(a, _), Number(b, _)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Empty, Empty) => Ordering::Equal,
            (Number(..), _) => Ordering::Less,
            (_, Number(..)) => Ordering::Greater,
            (Text(_), Empty) => Ordering::Less,
            (Empty, Text(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(_, raw) => f.write_str(raw),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Empty => serializer.serialize_none(),
            CellValue::Number(_, raw) => serializer.serialize_str(raw),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Decoded sheet contents.
///
/// Built only by [`ResultTable::from_csv`] (or [`ResultTable::new`] in
/// tests and callers that already hold rows), so every row has one value
/// per column and no row is entirely empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Rows dropped because they could not be parsed.
    #[serde(skip)]
    pub skipped_rows: usize,
}

impl ResultTable {
    /// Assemble a table from already-decoded rows, applying the same header
    /// and empty-row rules as CSV decoding.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let columns = clean_headers(columns.iter().map(String::as_str));
        let width = columns.len();
        let rows = rows
            .into_iter()
            .filter_map(|mut row| {
                if row[width.min(row.len())..].iter().any(|cell| !cell.is_empty()) {
                    return None;
                }
                row.resize(width, CellValue::Empty);
                Some(row)
            })
            .filter(|row| !row.iter().all(CellValue::is_empty))
            .collect();
        ResultTable {
            columns,
            rows,
            skipped_rows: 0,
        }
    }

    /// Decode a CSV payload.
    ///
    /// Invalid UTF-8 is replaced rather than rejected and malformed rows are
    /// skipped. Returns [`FetchError::Disguised`] when the payload looks like
    /// a web page and [`FetchError::NoData`] when nothing usable remains.
    pub fn from_csv(body: &[u8]) -> Result<Self, FetchError> {
        let decoded = String::from_utf8_lossy(body);
        let text = decoded.strip_prefix('\u{feff}').unwrap_or(decoded.as_ref());

        if looks_like_markup(text) {
            return Err(FetchError::Disguised("the response body is HTML markup".to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let raw_headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(e) => {
                log::debug!("CSV header row unreadable: {}", e);
                return Err(FetchError::NoData);
            }
        };

        if let Some(name) = raw_headers.iter().find(|h| is_suspicious_header(h)) {
            return Err(FetchError::Disguised(format!("column named {:?}", name.trim())));
        }

        let columns = clean_headers(raw_headers.iter());
        if columns.iter().all(|c| c.starts_with(UNNAMED_PREFIX)) {
            return Err(FetchError::NoData);
        }
        let width = columns.len();

        let mut rows = Vec::new();
        let mut skipped_rows = 0;
        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    log::debug!("skipping malformed CSV row: {}", e);
                    skipped_rows += 1;
                    continue;
                }
            };

            // Trailing separators past the header are harmless; data there is not.
            if record.iter().skip(width).any(|field| !field.trim().is_empty()) {
                skipped_rows += 1;
                continue;
            }

            let mut row: Vec<CellValue> = record.iter().take(width).map(CellValue::parse).collect();
            if row.iter().all(CellValue::is_empty) {
                continue;
            }
            row.resize(width, CellValue::Empty);
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(FetchError::NoData);
        }

        Ok(ResultTable {
            columns,
            rows,
            skipped_rows,
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

const UNNAMED_PREFIX: &str = "Unnamed: ";

// Trim names, name blank headers by position and suffix duplicates.
fn clean_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.enumerate()
        .map(|(i, header)| {
            let trimmed = header.trim();
            let base = if trimmed.is_empty() {
                format!("{}{}", UNNAMED_PREFIX, i)
            } else {
                trimmed.to_string()
            };
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}.{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

fn looks_like_markup(text: &str) -> bool {
    text.trim_start().starts_with('<')
}

fn is_suspicious_header(header: &str) -> bool {
    let lower = header.to_lowercase();
    lower.contains("copyright") || lower.contains("<html") || lower.contains("<!doctype")
}
