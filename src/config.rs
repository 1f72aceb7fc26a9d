use anyhow::{Context, Result};
use std::time::Duration;

use crate::error::AuthError;

pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.fitbit.com/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.fitbit.com/oauth2/token";
pub const DEFAULT_CALLBACK_PORT: u16 = 3000;
pub const DEFAULT_SCOPES: &str = "activity heartrate nutrition profile sleep weight";

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── OAuth client ────────────────────────────────────────────────────
    /// Optional at load time: a missing id/secret only stops the
    /// interactive flow and token calls, not the host process.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub http_timeout: Duration,

    // ── Local callback listener ─────────────────────────────────────────
    pub callback_port: u16,
    /// Must match the redirect URI registered with the provider exactly.
    pub redirect_uri: String,
    pub flow_timeout: Duration,
    pub open_browser: bool,

    // ── Database ────────────────────────────────────────────────────────
    pub database_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let callback_port: u16 = std::env::var("AUTH_CALLBACK_PORT")
            .unwrap_or_else(|_| DEFAULT_CALLBACK_PORT.to_string())
            .parse()
            .context("Invalid AUTH_CALLBACK_PORT")?;

        let flow_timeout_secs: u64 = std::env::var("AUTH_FLOW_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .context("Invalid AUTH_FLOW_TIMEOUT_SECS")?;

        let http_timeout_secs: u64 = std::env::var("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .context("Invalid HTTP_TIMEOUT_SECS")?;

        let open_browser = match std::env::var("AUTH_OPEN_BROWSER") {
            Ok(v) => parse_bool(&v).context("Invalid AUTH_OPEN_BROWSER")?,
            Err(_) => true,
        };

        Ok(Config {
            client_id: non_empty_var("FITBIT_CLIENT_ID"),
            client_secret: non_empty_var("FITBIT_CLIENT_SECRET"),
            scopes: parse_scopes(
                &std::env::var("FITBIT_SCOPES").unwrap_or_else(|_| DEFAULT_SCOPES.into()),
            ),
            authorize_url: std::env::var("FITBIT_AUTHORIZE_URL")
                .unwrap_or_else(|_| DEFAULT_AUTHORIZE_URL.into()),
            token_url: std::env::var("FITBIT_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.into()),
            http_timeout: Duration::from_secs(http_timeout_secs),

            callback_port,
            redirect_uri: std::env::var("FITBIT_REDIRECT_URI")
                .unwrap_or_else(|_| default_redirect_uri(callback_port)),
            flow_timeout: Duration::from_secs(flow_timeout_secs),
            open_browser,

            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL is required (PostgreSQL or SQLite connection string)")?,
        })
    }

    /// URL of the local redirect route that starts the browser leg.
    pub fn local_auth_url(&self) -> String {
        format!("http://localhost:{}/auth", self.callback_port)
    }
}

/// The client id/secret pair, or a `Config` error naming the missing variable.
pub fn client_credentials<'a>(
    client_id: Option<&'a str>,
    client_secret: Option<&'a str>,
) -> Result<(&'a str, &'a str), AuthError> {
    match (client_id, client_secret) {
        (Some(id), Some(secret)) => Ok((id, secret)),
        (None, _) => Err(AuthError::Config("FITBIT_CLIENT_ID is not set".into())),
        (_, None) => Err(AuthError::Config("FITBIT_CLIENT_SECRET is not set".into())),
    }
}

pub fn default_redirect_uri(port: u16) -> String {
    format!("http://localhost:{port}/callback")
}

/// Accepts space- or comma-separated scope lists.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            client_id: Some("23ABCD".into()),
            client_secret: Some("s3cret".into()),
            scopes: parse_scopes(DEFAULT_SCOPES),
            authorize_url: DEFAULT_AUTHORIZE_URL.into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            http_timeout: Duration::from_secs(30),
            callback_port: 3000,
            redirect_uri: default_redirect_uri(3000),
            flow_timeout: Duration::from_secs(600),
            open_browser: false,
            database_url: "sqlite::memory:".into(),
        }
    }

    #[test]
    fn parse_scopes_accepts_spaces_and_commas() {
        assert_eq!(
            parse_scopes("weight, sleep  profile,,activity"),
            vec!["weight", "sleep", "profile", "activity"]
        );
        assert!(parse_scopes("  ").is_empty());
    }

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn client_credentials_names_missing_variable() {
        let config = sample();
        assert_eq!(
            client_credentials(config.client_id.as_deref(), config.client_secret.as_deref())
                .unwrap(),
            ("23ABCD", "s3cret")
        );

        let err = client_credentials(Some("23ABCD"), None).unwrap_err();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("FITBIT_CLIENT_SECRET")));

        let err = client_credentials(None, Some("s3cret")).unwrap_err();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("FITBIT_CLIENT_ID")));
    }

    #[test]
    fn redirect_uri_defaults_to_local_callback() {
        assert_eq!(default_redirect_uri(3000), "http://localhost:3000/callback");
        assert_eq!(sample().local_auth_url(), "http://localhost:3000/auth");
    }
}
