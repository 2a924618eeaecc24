use axum::{
    Extension, Form, Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::downloader;
use crate::fetcher::{HttpSource, SheetFetcher};
use crate::login::{self, Session, SessionStore};
use crate::render::{DashboardPage, Templates};
use crate::view::{DisplayState, ViewOptions};

/// Shared state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub fetcher: SheetFetcher<HttpSource>,
    pub sessions: SessionStore,
    pub templates: Templates,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let source = HttpSource::new(config.fetch_timeout)?;
        Ok(AppState {
            config,
            fetcher: SheetFetcher::new(source),
            sessions: SessionStore::new(),
            templates: Templates::new()?,
        })
    }

    /// Fetch (or reuse) the sheet and shape it for display.
    pub async fn display_state(&self, query: &str) -> DisplayState {
        let reference = self.config.spreadsheet_url.as_deref().unwrap_or("");
        let outcome = self.fetcher.fetch(reference, self.config.cache_ttl).await;
        let options = ViewOptions {
            query: query.to_string(),
            sort_columns: self.config.sort_columns.clone(),
            hints: self.config.column_hints.clone(),
        };
        DisplayState::from_outcome(&outcome, &options)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshForm {
    #[serde(default)]
    q: String,
}

/// Build the router. Everything except the login flow and static assets
/// requires a session.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(serve_dashboard))
        .route("/refresh", post(refresh))
        .route("/api/table", get(get_table_data))
        .route("/download.csv", get(download_csv))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    Router::new()
        .route(
            "/login",
            get(login::serve_login_page).post(login::handle_login),
        )
        .route("/logout", post(login::handle_logout))
        .merge(protected)
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if config.spreadsheet_url.is_none() {
        warn!("SPREADSHEET_URL is not set; the dashboard will show a configuration warning");
    }
    if config.app_password.is_none() {
        warn!("APP_PASSWORD is not set; no password will be accepted");
    }

    let addr = config.bind_addr;
    let app_state = Arc::new(AppState::new(config)?);
    let app = router(app_state);

    // Start server
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let display = state.display_state(&params.q).await;
    let page = DashboardPage::new(&state.config.title, &params.q, &display);
    match state.templates.dashboard(&page) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("failed to render dashboard: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Form(form): Form<RefreshForm>,
) -> Redirect {
    info!(
        "manual refresh requested (session {})",
        session.id.as_deref().map(short_id).unwrap_or("-")
    );
    state.fetcher.invalidate_all();

    let q = form.q.trim();
    if q.is_empty() {
        Redirect::to("/")
    } else {
        Redirect::to(&format!("/?q={}", urlencoding::encode(q)))
    }
}

async fn get_table_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    match state.display_state(&params.q).await {
        DisplayState::Unavailable(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "error",
                "kind": e.kind(),
                "message": e.to_string(),
            })),
        )
            .into_response(),
        DisplayState::NoMatches(view) | DisplayState::Rows(view) => Json(serde_json::json!({
            "status": "ok",
            "query": view.query,
            "columns": view.columns,
            "rows": view.rows,
            "total_rows": view.total_rows,
            "shown_rows": view.rows.len(),
            "sorted": view.sorted,
            "missing_sort_columns": view.missing_sort_columns,
            "fetched_at": view.fetched_at,
        }))
        .into_response(),
    }
}

async fn download_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let display = state.display_state(&params.q).await;
    let Some(view) = display.view() else {
        let message = match &display {
            DisplayState::Unavailable(e) => e.to_string(),
            _ => String::new(),
        };
        return (StatusCode::SERVICE_UNAVAILABLE, message).into_response();
    };

    match downloader::to_csv(view) {
        Ok(csv) => {
            let filename = downloader::download_filename(&state.config.title);
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!(
                            "attachment; filename=\"sheet.csv\"; filename*=UTF-8''{}",
                            urlencoding::encode(&filename)
                        ),
                    ),
                ],
                csv,
            )
                .into_response()
        }
        Err(e) => {
            error!("failed to export CSV: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Export error").into_response()
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
