use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::traits::OAuthClient;
use crate::config::{self, Config};
use crate::credential::{Credential, TokenSet};
use crate::error::AuthError;

/// Fitbit Web API OAuth 2.0 client.
///
/// Token lifetime: 8 hours by default.
/// Client authentication: HTTP Basic on the token endpoint (never in the body).
/// Refresh tokens are single-use; each refresh returns a new one.
pub struct FitbitClient {
    client_id: Option<String>,
    client_secret: Option<String>,
    authorize_url: Url,
    token_url: Url,
    http: reqwest::Client,
}

// Raw token response from Fitbit's token endpoint
#[derive(Debug, Deserialize)]
struct FitbitTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    token_type: Option<String>,
    user_id: Option<String>,
}

impl From<FitbitTokenResponse> for TokenSet {
    fn from(resp: FitbitTokenResponse) -> Self {
        TokenSet {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_in: resp.expires_in,
            scope: resp.scope,
            token_type: resp.token_type,
            user_id: resp.user_id,
        }
    }
}

impl FitbitClient {
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        authorize_url: &str,
        token_url: &str,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let authorize_url = Url::parse(authorize_url)
            .map_err(|e| AuthError::Config(format!("Invalid authorize URL {authorize_url}: {e}")))?;
        let token_url = Url::parse(token_url)
            .map_err(|e| AuthError::Config(format!("Invalid token URL {token_url}: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client_id,
            client_secret,
            authorize_url,
            token_url,
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            &config.authorize_url,
            &config.token_url,
            config.http_timeout,
        )
    }

    fn basic_auth_header(&self) -> Result<String, AuthError> {
        let (id, secret) =
            config::client_credentials(self.client_id.as_deref(), self.client_secret.as_deref())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{id}:{secret}"));
        Ok(format!("Basic {encoded}"))
    }

    /// POST a grant to the token endpoint. Errors are plain messages; the
    /// caller decides whether they are exchange or refresh failures.
    async fn token_request(&self, auth: &str, form: &[(&str, &str)]) -> Result<TokenSet, String> {
        let resp = self
            .http
            .post(self.token_url.clone())
            .header(reqwest::header::AUTHORIZATION, auth)
            .form(form)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {e}"))?;

        if !status.is_success() {
            let (code, message) = parse_error_details(&body);
            let mut msg = format!("token endpoint returned status={}", status.as_u16());
            if let Some(code) = code {
                msg.push_str(&format!(" code={code}"));
            }
            match message {
                Some(detail) => {
                    msg.push_str(" message=");
                    msg.extend(detail.chars().take(240));
                }
                None => {
                    msg.push_str(" body=");
                    msg.push_str(&error_body_snippet(&body));
                }
            }
            return Err(msg);
        }

        let token_resp: FitbitTokenResponse = serde_json::from_str(&body)
            .map_err(|e| format!("failed to parse token response: {e}"))?;

        if token_resp.access_token.trim().is_empty() {
            return Err("token response has an empty access_token".into());
        }

        Ok(token_resp.into())
    }
}

#[async_trait]
impl OAuthClient for FitbitClient {
    fn ensure_configured(&self) -> Result<(), AuthError> {
        self.basic_auth_header().map(|_| ())
    }

    fn authorization_url(&self, redirect_uri: &str, scopes: &[String]) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id.as_deref().unwrap_or_default())
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("response_type", "code");
        url.into()
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        let auth = self.basic_auth_header()?;
        let tokens = self
            .token_request(
                &auth,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                ],
            )
            .await
            .map_err(|e| AuthError::Exchange(format!("Fitbit code exchange failed: {e}")))?;

        Credential::from_token_set(tokens, None, Utc::now()).map_err(|e| {
            AuthError::Exchange(format!("Fitbit code exchange returned an unusable token: {e}"))
        })
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let auth = self.basic_auth_header()?;
        let tokens = self
            .token_request(
                &auth,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", credential.refresh_token.as_str()),
                ],
            )
            .await
            .map_err(|e| AuthError::Refresh(format!("Fitbit refresh failed: {e}")))?;

        Credential::from_token_set(tokens, Some(credential), Utc::now()).map_err(|e| {
            AuthError::Refresh(format!("Fitbit refresh returned an unusable token: {e}"))
        })
    }
}

/// Pull an error code and message out of a token endpoint error body.
///
/// Fitbit answers `{"errors":[{"errorType":..,"message":..}],"success":false}`;
/// plain RFC 6749 `error`/`error_description` bodies are accepted as well.
fn parse_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(first) = value
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
    {
        return (
            non_empty(first.get("errorType")),
            non_empty(first.get("message")),
        );
    }

    (
        non_empty(value.get("error")),
        non_empty(value.get("error_description")),
    )
}

/// Bounded body excerpt for logs, with token-looking JSON fields masked.
fn error_body_snippet(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_token_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(500).collect();
        }
    }
    body.chars().take(500).collect()
}

fn redact_token_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                let key = key.to_ascii_lowercase();
                if (key.contains("token") || key.contains("secret")) && nested.is_string() {
                    *nested = Value::String("***".into());
                } else {
                    redact_token_fields(nested);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_token_fields),
        _ => {}
    }
}
