//! SQL-backed store for the single OAuth credential.
//!
//! Goes through `sqlx::Any`, so `DATABASE_URL` may point at PostgreSQL
//! (production) or SQLite (local runs, tests). Table:
//! - `fitbit_tokens`: one row, `id = 1`, credential JSON in `token_data`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use sqlx::Row;
use tokio::sync::OnceCell;

use crate::credential::Credential;
use crate::error::AuthError;

/// Fixed key of the singleton credential row.
pub const CREDENTIAL_ID: i64 = 1;

/// Durable home of the credential. `TokenManager` writes through to it on
/// every exchange and refresh.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or overwrite the singleton credential.
    async fn save(&self, credential: &Credential) -> Result<(), AuthError>;

    /// `Ok(None)` when nothing has been stored yet. An unreadable row is an
    /// error, never `None`.
    async fn load(&self) -> Result<Option<Credential>, AuthError>;
}

/// Token store backed by a SQL database.
pub struct TokenStore {
    pool: AnyPool,
    schema: OnceCell<()>,
}

impl TokenStore {
    pub async fn new(db_url: &str) -> Result<Self, AuthError> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(|e| AuthError::Database(format!("Failed to connect to database: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: AnyPool) -> Self {
        Self {
            pool,
            schema: OnceCell::new(),
        }
    }

    /// Create the table if absent. Idempotent; `save` and `load` call it
    /// before their first query.
    pub async fn migrate(&self) -> Result<(), AuthError> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS fitbit_tokens (
                        id          BIGINT PRIMARY KEY,
                        token_data  TEXT NOT NULL,
                        created_at  BIGINT NOT NULL,
                        updated_at  BIGINT NOT NULL
                    )
                    "#,
                )
                .execute(&self.pool)
                .await?;
                Ok::<(), AuthError>(())
            })
            .await?;
        Ok(())
    }

    /// Creation and last-modification time of the credential row.
    pub async fn timestamps(&self) -> Result<Option<RecordTimestamps>, AuthError> {
        self.migrate().await?;

        let row = sqlx::query("SELECT created_at, updated_at FROM fitbit_tokens WHERE id = $1")
            .bind(CREDENTIAL_ID)
            .fetch_optional(&self.pool)
            .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let created_at: i64 = row.try_get(0)?;
        let updated_at: i64 = row.try_get(1)?;

        Ok(Some(RecordTimestamps {
            created_at: from_millis(created_at)?,
            updated_at: from_millis(updated_at)?,
        }))
    }

    /// Expose the pool for direct use (maintenance, tests).
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for TokenStore {
    async fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        self.migrate().await?;

        let token_data = serde_json::to_string(credential)
            .map_err(|e| AuthError::Internal(format!("Failed to encode credential: {e}")))?;
        let now = Utc::now().timestamp_millis();

        // Single statement upsert; concurrent writers never interleave.
        sqlx::query(
            r#"
            INSERT INTO fitbit_tokens (id, token_data, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET
                token_data = EXCLUDED.token_data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(CREDENTIAL_ID)
        .bind(token_data)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self) -> Result<Option<Credential>, AuthError> {
        self.migrate().await?;

        let row = sqlx::query("SELECT token_data FROM fitbit_tokens WHERE id = $1")
            .bind(CREDENTIAL_ID)
            .fetch_optional(&self.pool)
            .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let token_data: String = row.try_get(0)?;
        let credential = serde_json::from_str(&token_data)
            .map_err(|e| AuthError::CorruptCredential(e.to_string()))?;

        Ok(Some(credential))
    }
}

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTimestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| AuthError::CorruptCredential(format!("invalid timestamp {millis}")))
}
