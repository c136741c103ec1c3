//! Mirror database schema and migrations
//!
//! The local mirror is a single key/value table in SQLite.
//! WAL mode keeps mirror writes crash safe.

use crate::error::Result;
use sqlx::sqlite::SqlitePool;

/// Ordered schema versions; each entry runs once
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("migrations/001_mirror_kv.sql"))];

/// Bring the mirror schema up to the latest version
pub async fn initialize_database(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Initializing mirror schema");

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM migrations")
        .fetch_one(pool)
        .await?;

    tracing::debug!("Mirror schema at version {}", current);

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        tracing::info!("Applying mirror migration {}", version);

        let mut tx = pool.begin().await?;
        for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    tracing::info!("Mirror schema ready");
    Ok(())
}
