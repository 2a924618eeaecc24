use crate::error::ConfigError;
use crate::view::{ColumnHint, ColumnWidth};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// Defaults
const DEFAULT_TTL_SECS: u64 = 10 * 60; // 10 minutes
const DEFAULT_SORT_COLUMNS: &str = "巻,ページ";
const DEFAULT_TITLE: &str = "Reading List";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// The configured spreadsheet reference; `None` when unset or blank.
    pub spreadsheet_url: Option<String>,
    /// `None` when unset or blank, in which case no password matches.
    pub app_password: Option<String>,
    pub cache_ttl: Duration,
    pub sort_columns: Vec<String>,
    pub column_hints: HashMap<String, ColumnHint>,
    pub fetch_timeout: Option<Duration>,
    pub title: String,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Read the process environment. Call [`load_dotenv`] first to pick up
    /// a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let cache_ttl = match non_blank("SHEET_CACHE_TTL_SECS") {
            Some(raw) => parse_seconds("SHEET_CACHE_TTL_SECS", &raw)?,
            None => Duration::from_secs(DEFAULT_TTL_SECS),
        };

        let fetch_timeout = non_blank("SHEET_FETCH_TIMEOUT_SECS")
            .map(|raw| parse_seconds("SHEET_FETCH_TIMEOUT_SECS", &raw))
            .transpose()?;

        let sort_columns = split_list(
            &lookup("SHEET_SORT_COLUMNS").unwrap_or_else(|| DEFAULT_SORT_COLUMNS.to_string()),
        );

        let column_hints = match non_blank("SHEET_COLUMN_HINTS") {
            Some(raw) => parse_column_hints(&raw)?,
            None => HashMap::new(),
        };

        let bind_raw = non_blank("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_raw.clone()))?;

        Ok(Config {
            spreadsheet_url: non_blank("SPREADSHEET_URL").map(|v| v.trim().to_string()),
            app_password: non_blank("APP_PASSWORD"),
            cache_ttl,
            sort_columns,
            column_hints,
            fetch_timeout,
            title: non_blank("DASHBOARD_TITLE").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            bind_addr,
        })
    }
}

/// Load variables from a `.env` file in the working directory or its
/// parents. Variables already set in the environment win.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_seconds(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds {
            name,
            value: raw.to_string(),
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `name=width[:wrap]` entries separated by commas.
pub fn parse_column_hints(raw: &str) -> Result<HashMap<String, ColumnHint>, ConfigError> {
    let mut hints = HashMap::new();
    for entry in split_list(raw) {
        let (name, spec) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidColumnHint(entry.clone()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidColumnHint(entry.clone()));
        }

        let mut hint = ColumnHint::default();
        for part in spec.split(':').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("wrap") {
                hint.wrap = true;
            } else {
                hint.width = Some(
                    ColumnWidth::parse(part)
                        .ok_or_else(|| ConfigError::InvalidColumnHint(entry.clone()))?,
                );
            }
        }
        hints.insert(name.to_string(), hint);
    }
    Ok(hints)
}
