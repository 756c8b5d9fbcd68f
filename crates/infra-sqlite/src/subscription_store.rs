// SQLite SubscriptionStore implementation.

use async_trait::async_trait;
use sqlx::SqlitePool;
use unipost_core::domain::{OwnerId, Tier};
use unipost_core::error::{AppError, Result};
use unipost_core::port::SubscriptionStore;

use crate::post_store::map_sqlx_error;

pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write path used by the billing webhook handler; the publish pipeline
    /// only ever reads.
    pub async fn set_tier(&self, owner: &OwnerId, tier: Tier, now_millis: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (owner, tier, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(owner) DO UPDATE SET
                tier = excluded.tier,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(owner)
        .bind(tier.as_str())
        .bind(now_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn tier(&self, owner: &OwnerId) -> Result<Option<Tier>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT tier FROM subscriptions WHERE owner = ?")
                .bind(owner)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        value
            .map(|raw| {
                Tier::parse(&raw).ok_or_else(|| {
                    AppError::Database(format!("unknown tier column value: {}", raw))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn store() -> SqliteSubscriptionStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteSubscriptionStore::new(pool)
    }

    #[tokio::test]
    async fn missing_owner_has_no_tier() {
        let store = store().await;
        assert!(store.tier(&"owner-1".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_tier_upserts() {
        let store = store().await;
        let owner = "owner-1".to_string();

        store.set_tier(&owner, Tier::Pro, 1_000).await.unwrap();
        assert_eq!(store.tier(&owner).await.unwrap(), Some(Tier::Pro));

        store.set_tier(&owner, Tier::Elite, 2_000).await.unwrap();
        assert_eq!(store.tier(&owner).await.unwrap(), Some(Tier::Elite));
    }
}
