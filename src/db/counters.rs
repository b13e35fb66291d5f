use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::config::COUNTER_ROW_ID;
use crate::db::models::CounterRow;
use crate::error::{AppError, Result};
use crate::types::{Action, CounterSnapshot};

const DB_ACQUIRE_TIMEOUT_SECS: u64 = 3;

/// Persistent single-row counter store.
///
/// Every mutation is one `UPDATE ... RETURNING` statement, so concurrent
/// requests never read-modify-write from the service side. A store without
/// a pool is valid: every call reports `BackendUnavailable` and the HTTP
/// boundary serves the fallback bundle.
#[derive(Clone)]
pub struct CounterStore {
    pool: Option<SqlitePool>,
}

impl CounterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn unconfigured() -> Self {
        Self { pool: None }
    }

    /// Build a lazily connecting store. The database is not touched here, so an
    /// unreachable backend shows up per request rather than at startup.
    pub fn from_url(url: Option<&str>) -> Self {
        let Some(url) = url else {
            info!("No database URL set: counters run in fallback mode");
            return Self::unconfigured();
        };

        match SqliteConnectOptions::from_str(url) {
            Ok(opts) => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS))
                    .connect_lazy_with(opts.create_if_missing(true));
                info!("Counter store configured");
                Self::new(pool)
            }
            Err(e) => {
                error!("Invalid database URL, counters run in fallback mode: {e}");
                Self::unconfigured()
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    fn pool(&self) -> Result<&SqlitePool> {
        self.pool.as_ref().ok_or_else(|| {
            AppError::BackendUnavailable(
                "database not configured, set NETLIFY_DATABASE_URL or DATABASE_URL".to_string(),
            )
        })
    }

    /// Create the table and the zeroed row if either is missing. Idempotent.
    pub async fn ensure_schema(&self) -> Result<()> {
        let pool = self.pool()?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS counters (
                id      INTEGER PRIMARY KEY,
                wins    INTEGER NOT NULL DEFAULT 0 CHECK (wins >= 0),
                prayers INTEGER NOT NULL DEFAULT 0 CHECK (prayers >= 0),
                hagels  INTEGER NOT NULL DEFAULT 0 CHECK (hagels >= 0)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO counters (id, wins, prayers, hagels) VALUES (?, 0, 0, 0)")
            .bind(COUNTER_ROW_ID)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Current row values.
    pub async fn fetch(&self) -> Result<CounterSnapshot> {
        let pool = self.pool()?;

        let row: Option<CounterRow> =
            sqlx::query_as("SELECT wins, prayers, hagels FROM counters WHERE id = ?")
                .bind(COUNTER_ROW_ID)
                .fetch_optional(pool)
                .await?;

        row.map(CounterSnapshot::from).ok_or_else(|| {
            AppError::BackendUnavailable("counter row missing".to_string())
        })
    }

    /// Apply `action` atomically and return the row as it stands afterwards.
    pub async fn apply_action_and_fetch(&self, action: Action) -> Result<CounterSnapshot> {
        self.ensure_schema().await?;

        let sql = match action {
            Action::Pray => "UPDATE counters SET prayers = prayers + 1 WHERE id = ? RETURNING wins, prayers, hagels",
            Action::Hagelslag => "UPDATE counters SET hagels = hagels + 1 WHERE id = ? RETURNING wins, prayers, hagels",
            Action::Win => "UPDATE counters SET wins = wins + 1 WHERE id = ? RETURNING wins, prayers, hagels",
            Action::Unwin => "UPDATE counters SET wins = MAX(wins - 1, 0) WHERE id = ? RETURNING wins, prayers, hagels",
            Action::None => return self.fetch().await,
        };

        let row: CounterRow = sqlx::query_as(sql)
            .bind(COUNTER_ROW_ID)
            .fetch_one(self.pool()?)
            .await?;

        debug!(
            action = %action,
            wins = row.wins,
            prayers = row.prayers,
            hagels = row.hagels,
            "counter updated"
        );
        Ok(row.into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
