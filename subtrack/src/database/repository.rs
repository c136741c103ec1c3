//! Key/value repository backing the local mirror
//!
//! Each mirror key holds one JSON document. Writes are upserts.

use crate::error::Result;
use chrono::Utc;
use sqlx::SqlitePool;

/// Repository for mirror entries
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read the value stored under `key`
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Insert or replace the value under `key`
    pub async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Stored mirror key: {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Remove `key`; missing keys are not an error
    pub async fn remove_value(&self, key: &str) -> Result<()> {
        let rows = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!("Removed mirror key: {} ({} rows)", key, rows);
        Ok(())
    }

    /// All stored keys, sorted
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM kv ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::initialize_database;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_repo() -> Repository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();

        Repository::new(pool)
    }

    #[tokio::test]
    async fn test_set_and_get_value() {
        let repo = create_test_repo().await;

        repo.set_value("subscriptions", "[]").await.unwrap();

        let value = repo.get_value("subscriptions").await.unwrap();
        assert_eq!(value, Some("[]".to_string()));
    }

    #[tokio::test]
    async fn test_set_value_overwrites() {
        let repo = create_test_repo().await;

        repo.set_value("subscriptions", "[]").await.unwrap();
        repo.set_value("subscriptions", r#"[{"id":"1"}]"#).await.unwrap();

        let value = repo.get_value("subscriptions").await.unwrap();
        assert_eq!(value, Some(r#"[{"id":"1"}]"#.to_string()));
        assert_eq!(repo.list_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let repo = create_test_repo().await;

        assert_eq!(repo.get_value("absent").await.unwrap(), None);
        repo.remove_value("absent").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_value() {
        let repo = create_test_repo().await;

        repo.set_value("subscriptions_backup", "[]").await.unwrap();
        repo.remove_value("subscriptions_backup").await.unwrap();

        assert_eq!(repo.get_value("subscriptions_backup").await.unwrap(), None);
        assert!(repo.list_keys().await.unwrap().is_empty());
    }
}
