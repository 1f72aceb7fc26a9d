use async_trait::async_trait;

use crate::credential::Credential;
use crate::error::AuthError;

/// Protocol adapter for the authorization-code grant. Holds no credential
/// state of its own; persistence is the caller's job.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Fails with `AuthError::Config` when the client id/secret are missing.
    fn ensure_configured(&self) -> Result<(), AuthError> {
        Ok(())
    }

    /// Build the authorization URL the user's browser is sent to.
    ///
    /// - `redirect_uri`: The callback URL registered with the provider.
    /// - `scopes`: The OAuth scopes to request.
    fn authorization_url(&self, redirect_uri: &str, scopes: &[String]) -> String;

    /// Exchange an authorization code for a credential.
    ///
    /// Fails with `AuthError::Exchange` on transport failure, a non-2xx
    /// response, or a malformed body.
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
        -> Result<Credential, AuthError>;

    /// Run a refresh-token grant for `credential`.
    ///
    /// Fails with `AuthError::Refresh`. A rejected refresh token is final:
    /// the caller needs a new interactive authorization.
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;
}
