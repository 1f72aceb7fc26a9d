//! Shared fakes and setup helpers for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use fitbit_auth::{
    config::{default_redirect_uri, parse_scopes, DEFAULT_AUTHORIZE_URL, DEFAULT_TOKEN_URL},
    AuthError, Config, Credential, CredentialStore, FlowSettings, OAuthClient, TokenStore,
};

static INIT_LOGGER: Once = Once::new();

/// Quiet logging for tests; `TEST_LOG=debug` for more.
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let filter = std::env::var("TEST_LOG").unwrap_or_else(|_| "warn".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_test_writer()
            .try_init();
    });
}

/// File-backed SQLite store. Keep the `TempDir` alive for the test's duration.
pub async fn create_test_store() -> (TokenStore, tempfile::TempDir) {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("tokens.db").display());
    let store = TokenStore::new(&url).await.unwrap();
    (store, dir)
}

pub fn credential(access_token: &str, refresh_token: &str, expires_in_secs: i64) -> Credential {
    Credential {
        access_token: access_token.into(),
        refresh_token: refresh_token.into(),
        expires_at: Some(Utc::now() + ChronoDuration::seconds(expires_in_secs)),
        scope: Some("weight sleep".into()),
        token_type: Some("Bearer".into()),
        user_id: Some("ABC123".into()),
    }
}

pub fn expired_credential(access_token: &str, refresh_token: &str) -> Credential {
    credential(access_token, refresh_token, -60)
}

pub fn test_config() -> Config {
    Config {
        client_id: Some("23ABCD".into()),
        client_secret: Some("s3cret".into()),
        scopes: parse_scopes("weight sleep"),
        authorize_url: DEFAULT_AUTHORIZE_URL.into(),
        token_url: DEFAULT_TOKEN_URL.into(),
        http_timeout: Duration::from_secs(5),
        callback_port: 0,
        redirect_uri: default_redirect_uri(3000),
        flow_timeout: Duration::from_secs(30),
        open_browser: false,
        database_url: "sqlite::memory:".into(),
    }
}

pub fn flow_settings(timeout: Duration) -> FlowSettings {
    FlowSettings {
        port: 0,
        redirect_uri: default_redirect_uri(3000),
        scopes: parse_scopes("weight sleep"),
        timeout,
        open_browser: false,
    }
}

// ── Store fake ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    credential: Mutex<Option<Credential>>,
    pub saves: AtomicUsize,
    pub fail_saves: AtomicBool,
    pub fail_loads: AtomicBool,
}

impl MemoryStore {
    pub fn with(credential: Credential) -> Self {
        let store = Self::default();
        *store.credential.lock().unwrap() = Some(credential);
        store
    }

    pub fn stored(&self) -> Option<Credential> {
        self.credential.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AuthError::Database("disk full".into()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.credential.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(AuthError::CorruptCredential("expected value at line 1".into()));
        }
        Ok(self.stored())
    }
}

// ── OAuth client fake ───────────────────────────────────────────────────────

/// Token endpoint stand-in. Code `abc123` exchanges for `AT1`/`RT1`, code
/// `crash` panics mid-exchange; refreshes hand out `AT2`, `AT3`, ... after an optional delay.
pub struct FakeOAuthClient {
    pub refresh_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub configured: bool,
    pub delay: Duration,
}

impl Default for FakeOAuthClient {
    fn default() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            configured: true,
            delay: Duration::ZERO,
        }
    }
}

impl FakeOAuthClient {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::default()
        }
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthClient for FakeOAuthClient {
    fn ensure_configured(&self) -> Result<(), AuthError> {
        if self.configured {
            Ok(())
        } else {
            Err(AuthError::Config("FITBIT_CLIENT_ID is not set".into()))
        }
    }

    fn authorization_url(&self, redirect_uri: &str, scopes: &[String]) -> String {
        format!(
            "https://fitbit.test/oauth2/authorize?client_id=23ABCD&redirect_uri={redirect_uri}&scope={}&response_type=code",
            scopes.join("%20")
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match code {
            "abc123" => Ok(credential("AT1", "RT1", 3600)),
            "crash" => panic!("token endpoint client crashed"),
            other => Err(AuthError::Exchange(format!(
                "token endpoint returned status=400 code=invalid_grant message=Authorization code invalid: {other}"
            ))),
        }
    }

    async fn refresh(&self, previous: &Credential) -> Result<Credential, AuthError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::Refresh(
                "token endpoint returned status=400 code=invalid_grant".into(),
            ));
        }
        let mut refreshed = credential(&format!("AT{}", n + 1), &format!("RT{}", n + 1), 28_800);
        refreshed.user_id = previous.user_id.clone();
        Ok(refreshed)
    }
}

/// Poll until `check` holds or a few seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
