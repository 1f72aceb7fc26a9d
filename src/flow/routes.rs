//! Route handlers for the local callback listener.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::{AuthorizationFlow, FlowEvent};
use crate::error::AuthError;

const SUCCESS_HTML: &str = "<html><body><h1>Authorization successful</h1>\
     <p>Fitbit access has been granted. You may close this window.</p></body></html>";

pub(super) fn router(flow: Arc<AuthorizationFlow>) -> Router {
    Router::new()
        .route("/auth", get(auth_redirect))
        .route("/callback", get(callback))
        .layer(TraceLayer::new_for_http())
        .with_state(flow)
}

/// GET /auth: send the browser to the provider's authorization page.
async fn auth_redirect(State(flow): State<Arc<AuthorizationFlow>>) -> Response {
    let auth_url = flow.authorization_url();
    (StatusCode::FOUND, [(header::LOCATION, auth_url)]).into_response()
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /callback: provider redirect target. Terminal for the listener.
async fn callback(
    State(flow): State<Arc<AuthorizationFlow>>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Response {
    let q = match query {
        Ok(Query(q)) => q,
        Err(rejection) => {
            let reason = format!("malformed callback query: {}", rejection.body_text());
            return reject_callback(&flow, reason).into_response();
        }
    };

    // Detached so a browser hanging up mid-exchange cannot strand the
    // session in `Exchanging`.
    let outcome = tokio::spawn(complete_authorization(Arc::clone(&flow), q)).await;

    match outcome {
        Ok(Ok(())) => (StatusCode::OK, Html(SUCCESS_HTML)).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            flow.transition(FlowEvent::ExchangeFailed);
            AuthError::Internal(format!("callback task failed: {e}")).into_response()
        }
    }
}

async fn complete_authorization(
    flow: Arc<AuthorizationFlow>,
    q: CallbackQuery,
) -> Result<(), AuthError> {
    let code = q
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let Some(code) = code else {
        let reason = match q.error {
            Some(err) => format!(
                "provider returned {err}: {}",
                q.error_description.unwrap_or_default()
            ),
            None => "missing authorization code".to_string(),
        };
        return Err(reject_callback(&flow, reason));
    };

    if !flow.transition(FlowEvent::CallbackReceived) {
        return Err(not_awaiting());
    }
    let _guard = ExchangeGuard(Arc::clone(&flow));
    info!("Authorization code received, exchanging for tokens");

    match flow
        .client
        .exchange_code(code, &flow.settings.redirect_uri)
        .await
    {
        Ok(credential) => {
            info!(
                user_id = credential.user_id.as_deref().unwrap_or_default(),
                "Authorization complete"
            );
            flow.manager.store_credential(credential).await;
            flow.transition(FlowEvent::ExchangeSucceeded);
            Ok(())
        }
        Err(e) => {
            error!("Authorization code exchange failed: {e}");
            flow.transition(FlowEvent::ExchangeFailed);
            Err(e)
        }
    }
}

/// Fail the session on a callback that carries no usable code.
fn reject_callback(flow: &AuthorizationFlow, reason: String) -> AuthError {
    if !flow.transition(FlowEvent::CallbackRejected) {
        return not_awaiting();
    }
    warn!("Authorization callback rejected: {reason}");
    AuthError::Callback(reason)
}

fn not_awaiting() -> AuthError {
    AuthError::Flow("no authorization is awaiting a callback".into())
}

/// Moves a session still `Exchanging` to `Failed` when the exchange ends
/// without an outcome, e.g. by panicking.
struct ExchangeGuard(Arc<AuthorizationFlow>);

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        if self.0.transition(FlowEvent::ExchangeFailed) {
            error!("Authorization exchange aborted before completing");
        }
    }
}
