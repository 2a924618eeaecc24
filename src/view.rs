//! The stages between a fetched table and what the dashboard shows:
//! substring search, multi-key sort and per-column display hints.

use crate::error::FetchError;
use crate::fetcher::FetchOutcome;
use crate::table::{CellValue, ResultTable};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnWidth {
    Small,
    Medium,
    Large,
}

impl ColumnWidth {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "small" => Some(ColumnWidth::Small),
            "medium" => Some(ColumnWidth::Medium),
            "large" => Some(ColumnWidth::Large),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnWidth::Small => "small",
            ColumnWidth::Medium => "medium",
            ColumnWidth::Large => "large",
        }
    }
}

/// Rendering hint for one column, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnHint {
    pub width: Option<ColumnWidth>,
    pub wrap: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub query: String,
    pub sort_columns: Vec<String>,
    pub hints: HashMap<String, ColumnHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnView {
    pub name: String,
    pub width: Option<ColumnWidth>,
    pub wrap: bool,
}

/// Rows ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub columns: Vec<ColumnView>,
    pub rows: Vec<Vec<CellValue>>,
    pub query: String,
    /// Row count before filtering.
    pub total_rows: usize,
    pub sorted: bool,
    /// Configured sort columns missing from the sheet.
    pub missing_sort_columns: Vec<String>,
    pub fetched_at: String,
}

/// What the dashboard shows. A failed fetch and a search that matched
/// nothing are different outcomes; only the first is a problem.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayState {
    Unavailable(FetchError),
    NoMatches(TableView),
    Rows(TableView),
}

impl DisplayState {
    pub fn from_outcome(outcome: &FetchOutcome, options: &ViewOptions) -> Self {
        match outcome {
            Err(e) => DisplayState::Unavailable(e.clone()),
            Ok(snapshot) => {
                let mut view = build_view(&snapshot.table, options);
                view.fetched_at = snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S").to_string();
                if view.rows.is_empty() {
                    DisplayState::NoMatches(view)
                } else {
                    DisplayState::Rows(view)
                }
            }
        }
    }

    pub fn view(&self) -> Option<&TableView> {
        match self {
            DisplayState::Unavailable(_) => None,
            DisplayState::NoMatches(view) | DisplayState::Rows(view) => Some(view),
        }
    }
}

/// Keep rows where any cell's display form contains `query`, ignoring case.
/// A blank query keeps everything.
pub fn filter_rows(rows: &[Vec<CellValue>], query: &str) -> Vec<Vec<CellValue>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return rows.to_vec();
    }
    rows.iter()
        .filter(|row| {
            row.iter()
                .any(|cell| cell.to_string().to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

/// Stable sort by `keys`, in order. Returns the names of missing keys; if
/// any is missing the rows are left in load order.
pub fn sort_rows(columns: &[String], rows: &mut [Vec<CellValue>], keys: &[String]) -> Vec<String> {
    let mut indices = Vec::with_capacity(keys.len());
    let mut missing = Vec::new();
    for key in keys {
        match columns.iter().position(|c| c == key) {
            Some(i) => indices.push(i),
            None => missing.push(key.clone()),
        }
    }
    if !missing.is_empty() || indices.is_empty() {
        return missing;
    }

    rows.sort_by(|a, b| {
        indices
            .iter()
            .map(|&i| a[i].sort_cmp(&b[i]))
            .find(|ord| ord.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    missing
}

pub fn build_view(table: &ResultTable, options: &ViewOptions) -> TableView {
    let mut rows = filter_rows(&table.rows, &options.query);
    let missing = sort_rows(&table.columns, &mut rows, &options.sort_columns);
    if !missing.is_empty() {
        log::warn!("sort column(s) {:?} not found; showing rows in sheet order", missing);
    }

    let columns = table
        .columns
        .iter()
        .map(|name| {
            let hint = options.hints.get(name).cloned().unwrap_or_default();
            ColumnView {
                name: name.clone(),
                width: hint.width,
                wrap: hint.wrap,
            }
        })
        .collect();

    TableView {
        columns,
        rows,
        query: options.query.trim().to_string(),
        total_rows: table.row_count(),
        sorted: missing.is_empty() && !options.sort_columns.is_empty(),
        missing_sort_columns: missing,
        fetched_at: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::Snapshot;
    use chrono::Local;
    use std::sync::Arc;

    fn books() -> ResultTable {
        ResultTable::from_csv(
            "巻,ページ,内容\n2,30,b\n1,7,a\n2,5,c\n1,70,d\n,1,e\n".as_bytes(),
        )
        .unwrap()
    }

    fn keys() -> Vec<String> {
        vec!["巻".to_string(), "ページ".to_string()]
    }

    fn texts(rows: &[Vec<CellValue>], col: usize) -> Vec<String> {
        rows.iter().map(|r| r[col].to_string()).collect()
    }

    #[test]
    fn two_key_sort() {
        let table = books();
        let mut rows = table.rows.clone();
        let missing = sort_rows(&table.columns, &mut rows, &keys());
        assert!(missing.is_empty());
        assert_eq!(texts(&rows, 2), ["a", "d", "c", "b", "e"]);
    }

    #[test]
    fn missing_sort_columns_keep_load_order() {
        let table = ResultTable::from_csv(b"title,page\nz,2\na,1\n").unwrap();
        let view = build_view(&table, &ViewOptions {
            sort_columns: keys(),
            ..Default::default()
        });
        assert!(!view.sorted);
        assert_eq!(view.missing_sort_columns, keys());
        assert_eq!(texts(&view.rows, 0), ["z", "a"]);
    }

    #[test]
    fn search_matches_substrings_in_any_cell() {
        let table = books();
        let rows = filter_rows(&table.rows, "7");
        assert_eq!(texts(&rows, 2), ["a", "d"]);
    }

    #[test]
    fn search_sees_numbers_as_written() {
        let table = ResultTable::from_csv(b"price,tel\n1.50,09012345678\n2,1\n").unwrap();
        assert_eq!(filter_rows(&table.rows, "1.50").len(), 1);
        assert_eq!(filter_rows(&table.rows, "090").len(), 1);
    }

    #[test]
    fn search_ignores_case() {
        let table = ResultTable::from_csv(b"name\nAlice\nbob\nALICIA\n").unwrap();
        assert_eq!(texts(&filter_rows(&table.rows, "ali"), 0), ["Alice", "ALICIA"]);
        assert_eq!(filter_rows(&table.rows, "  ").len(), 3);
    }

    #[test]
    fn hints_apply_to_existing_columns_only() {
        let table = books();
        let mut hints = HashMap::new();
        hints.insert("内容".to_string(), ColumnHint {
            width: Some(ColumnWidth::Large),
            wrap: true,
        });
        hints.insert("absent".to_string(), ColumnHint::default());
        let view = build_view(&table, &ViewOptions {
            hints,
            ..Default::default()
        });
        assert_eq!(view.columns.len(), 3);
        assert_eq!(view.columns[2].width, Some(ColumnWidth::Large));
        assert!(view.columns[2].wrap);
        assert_eq!(view.columns[0].width, None);
    }

    #[test]
    fn no_matches_is_not_a_failure() {
        let outcome: FetchOutcome = Ok(Arc::new(Snapshot {
            table: books(),
            fetched_at: Local::now(),
        }));
        let state = DisplayState::from_outcome(&outcome, &ViewOptions {
            query: "nothing like this".to_string(),
            ..Default::default()
        });
        match state {
            DisplayState::NoMatches(view) => {
                assert_eq!(view.total_rows, 5);
                assert!(!view.fetched_at.is_empty());
            }
            other => panic!("expected NoMatches, got {:?}", other),
        }

        let failed: FetchOutcome = Err(FetchError::Status(500));
        let state = DisplayState::from_outcome(&failed, &ViewOptions::default());
        assert_eq!(state, DisplayState::Unavailable(FetchError::Status(500)));
        assert!(state.view().is_none());
    }

    #[test]
    fn width_names() {
        assert_eq!(ColumnWidth::parse(" Large "), Some(ColumnWidth::Large));
        assert_eq!(ColumnWidth::parse("huge"), None);
        assert_eq!(ColumnWidth::Small.as_str(), "small");
    }
}
