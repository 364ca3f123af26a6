use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};

use crate::error::StorageError;
use crate::model::{Alert, Direction, NewAlert, UserAlert, UserId};
use crate::storage::AlertStore;

type AlertRow = (i64, i64, String, f64, String, String);

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl AlertStore for SqliteStorage {
    fn insert(&self, alert: &NewAlert) -> BoxFuture<'_, Result<Alert, Report<StorageError>>> {
        let alert = alert.clone();
        Box::pin(async move {
            let created_at = Utc::now();
            let result = sqlx::query(
                "INSERT INTO alerts (user_id, coin, target_price, alert_type, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(alert.user_id)
            .bind(&alert.coin)
            .bind(alert.target_price)
            .bind(alert.direction.as_str())
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)?;

            Ok(Alert {
                id: result.last_insert_rowid(),
                user_id: alert.user_id,
                coin: alert.coin,
                target_price: alert.target_price,
                direction: alert.direction,
                created_at,
            })
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Alert>, Report<StorageError>>> {
        Box::pin(async move {
            let rows: Vec<AlertRow> = sqlx::query_as(
                "SELECT id, user_id, coin, target_price, alert_type, created_at FROM alerts",
            )
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            Ok(rows.into_iter().map(map_alert_row).collect())
        })
    }

    fn list_for_user(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'_, Result<Vec<UserAlert>, Report<StorageError>>> {
        Box::pin(async move {
            let rows: Vec<(String, f64, String)> = sqlx::query_as(
                "SELECT coin, target_price, alert_type FROM alerts \
                 WHERE user_id = ? \
                 ORDER BY id ASC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            Ok(rows
                .into_iter()
                .map(|(coin, target_price, alert_type)| UserAlert {
                    coin,
                    target_price,
                    direction: parse_direction(&alert_type),
                })
                .collect())
        })
    }

    fn remove_by_id(&self, id: i64) -> BoxFuture<'_, Result<bool, Report<StorageError>>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM alerts WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .change_context(StorageError::Delete)?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn remove(
        &self,
        user_id: UserId,
        coin: &str,
    ) -> BoxFuture<'_, Result<u64, Report<StorageError>>> {
        let coin = coin.to_string();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM alerts WHERE user_id = ? AND coin = ?")
                .bind(user_id)
                .bind(&coin)
                .execute(&self.pool)
                .await
                .change_context(StorageError::Delete)?;

            Ok(result.rows_affected())
        })
    }
}

fn map_alert_row((id, user_id, coin, target_price, alert_type, created_at): AlertRow) -> Alert {
    Alert {
        id,
        user_id,
        coin,
        target_price,
        direction: parse_direction(&alert_type),
        created_at: parse_time_utc(&created_at),
    }
}

fn parse_direction(value: &str) -> Direction {
    // Rows are only ever written through Direction::as_str, so anything
    // unrecognized is treated as the conservative default.
    Direction::from_input(value).unwrap_or(Direction::Above)
}

fn parse_time_utc(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn in_memory_storage() -> SqliteStorage {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteStorage { pool }
    }

    fn new_alert(user_id: UserId, coin: &str, target: f64, direction: Direction) -> NewAlert {
        NewAlert {
            user_id,
            coin: coin.to_string(),
            target_price: target,
            direction,
        }
    }

    #[tokio::test]
    async fn insert_returns_generated_ids() {
        let storage = in_memory_storage().await;
        let a = storage
            .insert(&new_alert(1, "bitcoin", 50000.0, Direction::Above))
            .await
            .unwrap();
        let b = storage
            .insert(&new_alert(1, "ethereum", 3000.0, Direction::Below))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.coin, "bitcoin");
        assert_eq!(a.direction, Direction::Above);
    }

    #[tokio::test]
    async fn duplicate_user_coin_pairs_coexist() {
        let storage = in_memory_storage().await;
        storage
            .insert(&new_alert(1, "bitcoin", 50000.0, Direction::Above))
            .await
            .unwrap();
        storage
            .insert(&new_alert(1, "bitcoin", 40000.0, Direction::Below))
            .await
            .unwrap();

        let all = storage.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn list_all_is_idempotent_without_writes() {
        let storage = in_memory_storage().await;
        storage
            .insert(&new_alert(1, "bitcoin", 50000.0, Direction::Above))
            .await
            .unwrap();
        storage
            .insert(&new_alert(2, "ethereum", 3000.0, Direction::Below))
            .await
            .unwrap();

        let first = storage.list_all().await.unwrap();
        let second = storage.list_all().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn list_for_user_filters_and_projects() {
        let storage = in_memory_storage().await;
        storage
            .insert(&new_alert(1, "bitcoin", 50000.0, Direction::Above))
            .await
            .unwrap();
        storage
            .insert(&new_alert(2, "ethereum", 3000.0, Direction::Below))
            .await
            .unwrap();

        let alerts = storage.list_for_user(1).await.unwrap();
        assert_eq!(
            alerts,
            vec![UserAlert {
                coin: "bitcoin".into(),
                target_price: 50000.0,
                direction: Direction::Above,
            }]
        );
    }

    #[tokio::test]
    async fn remove_by_id_deletes_only_that_row() {
        let storage = in_memory_storage().await;
        let a = storage
            .insert(&new_alert(1, "bitcoin", 50000.0, Direction::Above))
            .await
            .unwrap();
        storage
            .insert(&new_alert(1, "bitcoin", 40000.0, Direction::Below))
            .await
            .unwrap();

        assert!(storage.remove_by_id(a.id).await.unwrap());
        // Second delete of the same id reports no match
        assert!(!storage.remove_by_id(a.id).await.unwrap());

        let all = storage.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].target_price, 40000.0);
    }

    #[tokio::test]
    async fn remove_deletes_all_matching_rows() {
        let storage = in_memory_storage().await;
        storage
            .insert(&new_alert(1, "bitcoin", 50000.0, Direction::Above))
            .await
            .unwrap();
        storage
            .insert(&new_alert(1, "bitcoin", 40000.0, Direction::Below))
            .await
            .unwrap();
        storage
            .insert(&new_alert(1, "ethereum", 3000.0, Direction::Above))
            .await
            .unwrap();

        assert_eq!(storage.remove(1, "bitcoin").await.unwrap(), 2);
        assert_eq!(storage.remove(1, "bitcoin").await.unwrap(), 0);

        let remaining = storage.list_for_user(1).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].coin, "ethereum");
    }
}
