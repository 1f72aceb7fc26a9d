//! In-memory owner of the credential.
//!
//! Serves `access_token()` from cache and refreshes lazily on expiry. All
//! reads, refreshes and writes go through one async mutex, so at most one
//! refresh is ever in flight; callers queued behind it see its result.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use super::db::CredentialStore;
use crate::credential::Credential;
use crate::providers::OAuthClient;

pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    client: Arc<dyn OAuthClient>,
    cached: Mutex<Option<Credential>>,
    ready: watch::Sender<bool>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn CredentialStore>, client: Arc<dyn OAuthClient>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            store,
            client,
            cached: Mutex::new(None),
            ready,
        }
    }

    /// Load the stored credential into the cache, refreshing it once if it
    /// has already expired. Any failure leaves the cache empty.
    pub async fn initialize(&self) {
        let mut cached = self.cached.lock().await;

        *cached = match self.store.load().await {
            Ok(Some(credential)) if credential.is_expired() => {
                info!(
                    user_id = credential.user_id.as_deref().unwrap_or_default(),
                    "Stored credential has expired, refreshing"
                );
                self.refresh(&credential).await
            }
            Ok(Some(credential)) => {
                info!(
                    user_id = credential.user_id.as_deref().unwrap_or_default(),
                    expires_at = ?credential.expires_at,
                    "Loaded stored credential"
                );
                Some(credential)
            }
            Ok(None) => {
                info!("No stored credential, authorization required");
                None
            }
            Err(e) => {
                warn!("Could not load stored credential, treating as absent: {e}");
                None
            }
        };

        self.publish(cached.is_some());
    }

    /// A valid access token, or `None` when re-authorization is required.
    ///
    /// Never fails. An expired credential is refreshed exactly once; if that
    /// refresh is rejected the cache is cleared.
    pub async fn access_token(&self) -> Option<String> {
        let mut cached = self.cached.lock().await;

        let expired = match cached.as_ref() {
            None => return None,
            Some(credential) if !credential.is_expired() => {
                return Some(credential.access_token.clone())
            }
            Some(credential) => credential.clone(),
        };

        *cached = self.refresh(&expired).await;
        self.publish(cached.is_some());

        cached.as_ref().map(|c| c.access_token.clone())
    }

    /// Cache a credential from a fresh code exchange and write it through to
    /// the store. A failed save is logged; the cached copy stays usable.
    pub async fn store_credential(&self, credential: Credential) {
        let mut cached = self.cached.lock().await;
        self.persist(&credential).await;
        *cached = Some(credential);
        self.publish(true);
    }

    pub async fn has_credential(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    /// Copy of the cached credential.
    pub async fn credential(&self) -> Option<Credential> {
        self.cached.lock().await.clone()
    }

    /// Watch whether a credential is cached. Flips to `true` when an
    /// interactive authorization completes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    // Caller holds the cache lock.
    async fn refresh(&self, expired: &Credential) -> Option<Credential> {
        match self.client.refresh(expired).await {
            Ok(refreshed) => {
                info!(
                    user_id = refreshed.user_id.as_deref().unwrap_or_default(),
                    expires_at = ?refreshed.expires_at,
                    "Refreshed access token"
                );
                self.persist(&refreshed).await;
                Some(refreshed)
            }
            Err(e) => {
                warn!("Token refresh rejected, re-authorization required: {e}");
                None
            }
        }
    }

    async fn persist(&self, credential: &Credential) {
        if let Err(e) = self.store.save(credential).await {
            error!("Failed to persist credential, keeping in-memory copy only: {e}");
        }
    }

    fn publish(&self, ready: bool) {
        self.ready.send_if_modified(|current| {
            let changed = *current != ready;
            *current = ready;
            changed
        });
    }
}
