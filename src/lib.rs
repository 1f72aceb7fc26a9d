pub mod config;
pub mod credential;
pub mod error;
pub mod flow;
pub mod providers;
pub mod store;

pub use config::Config;
pub use credential::{Credential, TokenSet, TokenSetError};
pub use error::AuthError;
pub use flow::{AuthorizationFlow, FlowSettings, FlowState};
pub use providers::{FitbitClient, OAuthClient};
pub use store::{CredentialStore, TokenManager, TokenStore};

use std::sync::Arc;

/// Authorization subsystem handed to the API tool handlers.
///
/// Lifecycle: `initialize` once at startup, then any number of
/// `get_access_token` calls. A `None` token means re-authorization is needed.
pub struct AuthService {
    config: Config,
    manager: Arc<TokenManager>,
    flow: Arc<AuthorizationFlow>,
}

impl AuthService {
    pub fn new(
        config: Config,
        store: Arc<dyn CredentialStore>,
        client: Arc<dyn OAuthClient>,
    ) -> Self {
        let manager = Arc::new(TokenManager::new(store, Arc::clone(&client)));
        let flow = Arc::new(AuthorizationFlow::new(
            FlowSettings::from_config(&config),
            client,
            Arc::clone(&manager),
        ));
        Self {
            config,
            manager,
            flow,
        }
    }

    /// Wire the SQL token store and the Fitbit client from `config`.
    pub async fn from_config(config: Config) -> Result<Self, AuthError> {
        let store = TokenStore::new(&config.database_url).await?;
        let client = FitbitClient::from_config(&config)?;
        Ok(Self::new(config, Arc::new(store), Arc::new(client)))
    }

    /// Load (and if needed refresh) the stored credential. When none is
    /// usable, the interactive flow is started in the background.
    pub async fn initialize(&self) {
        self.manager.initialize().await;

        if !self.manager.has_credential().await {
            tracing::info!(
                "No usable credential, starting authorization at {}",
                self.config.local_auth_url()
            );
            self.start_authorization_flow();
        }
    }

    pub async fn get_access_token(&self) -> Option<String> {
        self.manager.access_token().await
    }

    /// Fire-and-forget. Returns whether a new session was started.
    pub fn start_authorization_flow(&self) -> bool {
        self.flow.start()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        &self.manager
    }

    pub fn flow(&self) -> &Arc<AuthorizationFlow> {
        &self.flow
    }
}
