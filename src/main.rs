use anyhow::Result;
use tracing::{error, info, warn};

use fitbit_auth::{AuthService, Config, FlowState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitbit_auth=info".into()),
        )
        .init();

    // Load config
    let config = Config::from_env()?;
    info!("fitbit-auth v{}", env!("CARGO_PKG_VERSION"));

    let service = AuthService::from_config(config).await?;
    info!("Token store connected ✓");

    service.initialize().await;

    if service.get_access_token().await.is_some() {
        info!("Stored credential is valid ✓");
        return Ok(());
    }

    // `initialize` has already started the session (or logged why it could
    // not), so `Idle` here means it is over.
    let mut flow_state = service.flow().subscribe();

    tokio::select! {
        _ = flow_state.wait_for(|s| *s == FlowState::Idle) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted before authorization completed");
            return Ok(());
        }
    }

    if service.manager().has_credential().await {
        info!("Authorization complete, credential stored ✓");
        Ok(())
    } else {
        error!("Authorization did not complete, see the log above for the cause; run again to retry");
        anyhow::bail!("authorization failed")
    }
}
