use crate::app::AppState;
use axum::{
    Form,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::{error, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Per-request authentication context.
///
/// Inserted into request extensions by [`require_auth`]; handlers read it
/// instead of consulting any global state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: Option<String>,
    pub authenticated: bool,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    created_at: SystemTime,
}

/// Server-side record of logged-in sessions.
///
/// A session stays valid until logout; there is no expiry.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session and return its id.
    pub fn create(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        let record = SessionRecord {
            created_at: SystemTime::now(),
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), record);
        session_id
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if let Some(record) = &removed {
            let age = record.created_at.elapsed().unwrap_or_default();
            info!("session ended after {}s", age.as_secs());
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the session named by the request's cookie.
    pub fn session_for(&self, jar: &CookieJar) -> Session {
        match jar.get(SESSION_COOKIE) {
            Some(cookie) if self.contains(cookie.value()) => Session {
                id: Some(cookie.value().to_string()),
                authenticated: true,
            },
            _ => Session::default(),
        }
    }
}

/// Plaintext comparison against the configured password. With no
/// configured password nothing matches.
pub fn check_password(expected: Option<&str>, input: &str) -> bool {
    match expected {
        Some(expected) if !expected.is_empty() => expected == input,
        _ => false,
    }
}

/// Login form data
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub error: Option<String>,
}

/// Serve the login page
///
/// Already-authenticated visitors are sent straight to the dashboard.
pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    if state.sessions.session_for(&jar).authenticated {
        return Redirect::to("/").into_response();
    }

    let failed = query.error.is_some();
    match state.templates.login(&state.config.title, failed) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("failed to render login page: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}

/// Handle login requests
///
/// Compares the submitted password with `APP_PASSWORD` and, if it matches,
/// creates a session and sets the session cookie.
///
/// # Returns
/// * `Response` - Redirect to the dashboard if successful, back to the login page if not
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if !check_password(state.config.app_password.as_deref(), &form.password) {
        warn!("rejected login attempt");
        return Redirect::to("/login?error=1").into_response();
    }

    // Replace any session the browser already had
    if let Some(old) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(old.value());
    }

    let session_id = state.sessions.create();
    info!("login succeeded; {} active session(s)", state.sessions.len());
    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), Redirect::to("/")).into_response()
}

/// Handle logout
///
/// Drops the server-side session and clears the cookie.
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login"),
    )
}

/// Authentication middleware
///
/// Resolves the session cookie into a [`Session`] extension. Unauthenticated
/// page requests are redirected to the login page; API requests get `401`.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = state.sessions.session_for(&jar);
    if session.authenticated {
        request.extensions_mut().insert(session);
        return next.run(request).await;
    }

    if request.uri().path().starts_with("/api/") {
        (StatusCode::UNAUTHORIZED, "Not logged in").into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}
