/*!
# Sheet Dashboard

A password-gated web page that shows a Google Sheets spreadsheet as a
searchable, sortable table.

## Overview

The spreadsheet is referenced by whatever URL the operator has at hand: the
editor URL, a "publish to the web" URL or a direct CSV export URL. The
server turns that reference into a CSV endpoint, downloads it, decodes it
leniently and keeps the result for a configurable time so page loads do not
hammer the upstream. A refresh button drops the cached copy.

## Architecture

### Acquisition
- **normalize**: ordered URL rewrite rules (first match wins)
- **fetcher**: `SheetFetcher`, the HTTP source and the result cache
- **table**: CSV decoding into a `ResultTable`
- **cache**: generic TTL cache with explicit invalidation

### Presentation
- **view**: search filter, multi-key sort, column hints and `DisplayState`
- **render**: handlebars templates for the login and dashboard pages
- **downloader**: CSV export of the current view

### Web layer (feature `web`)
- **login**: session store, password check and authentication middleware
- **app**: routing and handlers

## Failure handling

Every fetch failure (missing configuration, unreachable host, non-2xx
status, an HTML page where CSV was expected, an empty sheet) ends at the
fetch boundary as a `FetchError` and is rendered as a message. Malformed
rows are skipped; undecodable bytes are replaced.

## Endpoints

- `/login` - Password form (GET) and login (POST)
- `/logout` - Ends the session
- `/` - Dashboard, `?q=` filters rows
- `/refresh` - Clears the cache and reloads
- `/api/table` - Current view as JSON
- `/download.csv` - Current view as CSV
*/

pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod table;
pub mod view;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod render;

pub use error::{ConfigError, FetchError};
pub use fetcher::{CsvSource, FetchOutcome, Payload, SheetFetcher, Snapshot};
pub use normalize::{NormalizationRule, Normalizer, normalize};
pub use table::{CellValue, ResultTable};
pub use view::{DisplayState, TableView, ViewOptions};
