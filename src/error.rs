use thiserror::Error;

/// Why a fetch produced no table.
///
/// Every variant is caught at the fetch boundary and shown to the operator
/// as a message; none of them is fatal. The type is `Clone` because failed
/// outcomes are cached alongside successful ones.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Required configuration is missing or blank.
    #[error("configuration error: {0}")]
    Config(String),

    /// DNS, connection or body read failure.
    #[error("could not reach the spreadsheet: {0}")]
    Transport(String),

    /// The upstream answered with a non-2xx status.
    #[error("the spreadsheet endpoint answered with HTTP {0}")]
    Status(u16),

    /// The upstream answered 2xx but the body was not tabular data.
    #[error(
        "the spreadsheet returned a web page instead of CSV ({0}); check that the sheet is shared or published to the web"
    )]
    Disguised(String),

    /// The sheet decoded to zero columns or zero rows.
    #[error("the spreadsheet has no data")]
    NoData,
}

impl FetchError {
    /// Short machine-readable name used by the JSON API.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Config(_) => "config",
            FetchError::Transport(_) => "transport",
            FetchError::Status(_) => "status",
            FetchError::Disguised(_) => "disguised",
            FetchError::NoData => "no_data",
        }
    }

    /// `NoData` is informational; everything else is a warning.
    pub fn is_warning(&self) -> bool {
        !matches!(self, FetchError::NoData)
    }
}

/// Startup configuration that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },

    #[error("invalid column hint {0:?}; expected name=small|medium|large[:wrap]")]
    InvalidColumnHint(String),

    #[error("invalid BIND_ADDR {0:?}")]
    InvalidBindAddr(String),
}
