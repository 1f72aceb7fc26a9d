//! Interactive leg of the authorization-code grant.
//!
//! `start()` binds a short-lived local listener with two routes:
//! - `GET /auth`: 302 to the provider's authorization page
//! - `GET /callback`: receives the code, exchanges it, hands the credential
//!   to the `TokenManager`, then shuts the listener down
//!
//! At most one session runs at a time. Whatever way a session ends (callback,
//! timeout, bind failure, panic) the state returns to `Idle`.

mod routes;
pub mod state;

pub use state::{FlowEvent, FlowState};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AuthError;
use crate::providers::OAuthClient;
use crate::store::TokenManager;

/// Listener settings for one authorization session.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// `0` binds an ephemeral port.
    pub port: u16,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
    pub open_browser: bool,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.callback_port,
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            timeout: config.flow_timeout,
            open_browser: config.open_browser,
        }
    }
}

pub struct AuthorizationFlow {
    settings: FlowSettings,
    client: Arc<dyn OAuthClient>,
    manager: Arc<TokenManager>,
    state: watch::Sender<FlowState>,
    local_addr: watch::Sender<Option<SocketAddr>>,
}

impl AuthorizationFlow {
    pub fn new(
        settings: FlowSettings,
        client: Arc<dyn OAuthClient>,
        manager: Arc<TokenManager>,
    ) -> Self {
        let (state, _) = watch::channel(FlowState::Idle);
        let (local_addr, _) = watch::channel(None);
        Self {
            settings,
            client,
            manager,
            state,
            local_addr,
        }
    }

    /// Start a session in the background.
    ///
    /// Returns `false` without side effects if the client is not configured
    /// or a session is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if let Err(e) = self.client.ensure_configured() {
            error!("Cannot start authorization flow: {e}");
            return false;
        }

        if !self.transition(FlowEvent::Start) {
            info!(state = %self.state(), "Authorization flow already in progress");
            return false;
        }

        let flow = Arc::clone(self);
        tokio::spawn(flow.run());
        true
    }

    pub fn state(&self) -> FlowState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    /// Address of the bound listener while a session is active.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.borrow()
    }

    pub fn authorization_url(&self) -> String {
        self.client
            .authorization_url(&self.settings.redirect_uri, &self.settings.scopes)
    }

    /// Apply `event` atomically. Returns whether it was a valid transition.
    pub(crate) fn transition(&self, event: FlowEvent) -> bool {
        let mut from = FlowState::Idle;
        let mut to = None;

        self.state.send_if_modified(|state| {
            from = *state;
            to = state.on(event);
            match to {
                Some(next) => {
                    *state = next;
                    true
                }
                None => false,
            }
        });

        match to {
            Some(to) => {
                debug!(%from, %to, ?event, "Authorization flow transition");
                true
            }
            None => {
                debug!(%from, ?event, "Ignoring authorization flow event");
                false
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let _teardown = Teardown(Arc::clone(&self));

        match self.serve().await {
            Ok(()) => info!(outcome = %self.state(), "Authorization listener closed"),
            Err(e) => error!("Authorization flow failed: {e}"),
        }
    }

    async fn serve(self: &Arc<Self>) -> Result<(), AuthError> {
        let bound = TcpListener::bind(("127.0.0.1", self.settings.port))
            .await
            .and_then(|listener| Ok((listener.local_addr()?, listener)));

        let (addr, listener) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.transition(FlowEvent::BindFailed);
                return Err(AuthError::Flow(format!(
                    "Failed to bind callback listener on port {}: {e}",
                    self.settings.port
                )));
            }
        };

        self.local_addr.send_replace(Some(addr));
        self.transition(FlowEvent::ListenerReady);

        let start_url = format!("http://localhost:{}/auth", addr.port());
        info!(%addr, "Waiting for authorization, open {start_url} in a browser");
        if self.settings.open_browser {
            open_browser(start_url);
        }

        let app = routes::router(Arc::clone(self));
        axum::serve(listener, app)
            .with_graceful_shutdown(Arc::clone(self).shutdown_signal())
            .await
            .map_err(|e| AuthError::Flow(format!("Callback listener failed: {e}")))
    }

    /// Resolves once the session reaches a terminal state or times out
    /// before a callback arrived.
    async fn shutdown_signal(self: Arc<Self>) {
        tokio::select! {
            _ = terminal(self.subscribe()) => {}
            _ = tokio::time::sleep(self.settings.timeout) => {
                if self.transition(FlowEvent::TimedOut) {
                    warn!(
                        timeout_secs = self.settings.timeout.as_secs(),
                        "Authorization flow timed out, closing listener"
                    );
                } else {
                    // an exchange is in flight; let it finish
                    terminal(self.subscribe()).await;
                }
            }
        }
    }
}

/// Resets the session to `Idle` when the session task ends, including by
/// unwinding.
struct Teardown(Arc<AuthorizationFlow>);

impl Drop for Teardown {
    fn drop(&mut self) {
        self.0.local_addr.send_replace(None);
        self.0.transition(FlowEvent::TornDown);
    }
}

async fn terminal(mut state: watch::Receiver<FlowState>) {
    let _ = state.wait_for(|s| s.is_terminal()).await;
}

fn open_browser(url: String) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = open::that(&url) {
            warn!("Could not open a browser, visit {url} manually: {e}");
        }
    });
}
