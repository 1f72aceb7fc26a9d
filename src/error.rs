use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

/// Unified error type for the authorization subsystem.
///
/// None of these are fatal to the host process: every failure path ends in
/// "no valid access token", which is what collaborators branch on.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // ── Configuration ───────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    // ── Interactive flow ────────────────────────────────────────────────
    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Authorization flow error: {0}")]
    Flow(String),

    // ── Provider Errors ─────────────────────────────────────────────────
    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    // ── Persistence ─────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(String),

    #[error("Stored credential is corrupt: {0}")]
    CorruptCredential(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status and short code shown to the browser on the callback listener.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AuthError::Callback(_) => (StatusCode::BAD_REQUEST, "callback_error"),
            AuthError::Flow(_) => (StatusCode::CONFLICT, "flow_error"),
            AuthError::Exchange(_) => (StatusCode::INTERNAL_SERVER_ERROR, "exchange_failed"),
            AuthError::Refresh(_) => (StatusCode::INTERNAL_SERVER_ERROR, "refresh_failed"),
            AuthError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AuthError::CorruptCredential(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_credential")
            }
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        AuthError::Database(e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let body = format!(
            "<html><body><h1>Authorization failed</h1>\
             <p><code>{code}</code>: {message}</p>\
             <p>You may close this window and retry.</p></body></html>",
            message = escape_html(&self.to_string()),
        );

        (status, Html(body)).into_response()
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
