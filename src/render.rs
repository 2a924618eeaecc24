use crate::error::FetchError;
use crate::view::{ColumnView, DisplayState};
use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

const LOGIN_TEMPLATE: &str = "login";
const DASHBOARD_TEMPLATE: &str = "dashboard";

/// Compiled page templates.
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_template_string(LOGIN_TEMPLATE, include_str!("./static/login.hbs"))?;
        registry.register_template_string(
            DASHBOARD_TEMPLATE,
            include_str!("./static/dashboard.hbs"),
        )?;
        Ok(Templates { registry })
    }

    pub fn login(&self, title: &str, failed: bool) -> Result<String, RenderError> {
        self.registry
            .render(LOGIN_TEMPLATE, &LoginPage { title, error: failed })
    }

    pub fn dashboard(&self, page: &DashboardPage) -> Result<String, RenderError> {
        self.registry.render(DASHBOARD_TEMPLATE, page)
    }
}

#[derive(Serialize)]
struct LoginPage<'a> {
    title: &'a str,
    error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderCell {
    pub name: String,
    pub class: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyCell {
    pub text: String,
    pub class: String,
}

/// Everything the dashboard template needs, already formatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardPage {
    pub title: String,
    pub query: String,
    /// `rows`, `no_matches` or `unavailable`.
    pub state: &'static str,
    pub message: Option<String>,
    pub warning: bool,
    pub columns: Vec<HeaderCell>,
    pub rows: Vec<Vec<BodyCell>>,
    pub total_rows: usize,
    pub shown_rows: usize,
    pub fetched_at: Option<String>,
    pub sort_notice: Option<String>,
    pub download_href: String,
}

impl DashboardPage {
    pub fn new(title: &str, query: &str, state: &DisplayState) -> Self {
        let query = query.trim().to_string();
        let download_href = if query.is_empty() {
            "/download.csv".to_string()
        } else {
            format!("/download.csv?q={}", urlencoding::encode(&query))
        };

        let mut page = DashboardPage {
            title: title.to_string(),
            query,
            state: "unavailable",
            message: None,
            warning: false,
            columns: Vec::new(),
            rows: Vec::new(),
            total_rows: 0,
            shown_rows: 0,
            fetched_at: None,
            sort_notice: None,
            download_href,
        };

        match state {
            DisplayState::Unavailable(err) => {
                page.message = Some(unavailable_message(err));
                page.warning = err.is_warning();
            }
            DisplayState::NoMatches(view) | DisplayState::Rows(view) => {
                let classes: Vec<String> = view.columns.iter().map(column_class).collect();
                page.columns = view
                    .columns
                    .iter()
                    .zip(&classes)
                    .map(|(column, class)| HeaderCell {
                        name: column.name.clone(),
                        class: class.clone(),
                    })
                    .collect();
                page.rows = view
                    .rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .zip(&classes)
                            .map(|(cell, class)| BodyCell {
                                text: cell.to_string(),
                                class: class.clone(),
                            })
                            .collect()
                    })
                    .collect();
                page.total_rows = view.total_rows;
                page.shown_rows = view.rows.len();
                page.fetched_at = Some(view.fetched_at.clone());
                if !view.missing_sort_columns.is_empty() {
                    page.sort_notice = Some(format!(
                        "Sort column(s) {} not found, so rows are shown in sheet order. Check the first row of the spreadsheet.",
                        view.missing_sort_columns
                            .iter()
                            .map(|c| format!("\"{}\"", c))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                if matches!(state, DisplayState::NoMatches(_)) {
                    page.state = "no_matches";
                    page.message = Some(format!("No rows match \"{}\".", view.query));
                } else {
                    page.state = "rows";
                }
            }
        }
        page
    }
}

fn unavailable_message(err: &FetchError) -> String {
    match err {
        FetchError::NoData => "The spreadsheet has no data.".to_string(),
        other => {
            let mut msg = other.to_string();
            if let Some(first) = msg.get(..1) {
                let upper = first.to_uppercase();
                msg.replace_range(..1, &upper);
            }
            msg
        }
    }
}

fn column_class(column: &ColumnView) -> String {
    let mut class = match column.width {
        Some(width) => format!("col-{}", width.as_str()),
        None => "col-auto".to_string(),
    };
    if column.wrap {
        class.push_str(" wrap");
    }
    class
}
