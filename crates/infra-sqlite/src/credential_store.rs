// SQLite CredentialStore implementation.

use async_trait::async_trait;
use sqlx::SqlitePool;
use unipost_core::domain::{Destination, DestinationCredential, OwnerId};
use unipost_core::error::{AppError, Result};
use unipost_core::port::CredentialStore;

use crate::post_store::map_sqlx_error;

pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(
        &self,
        owner: &OwnerId,
        destination: Destination,
    ) -> Result<Option<DestinationCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM social_accounts WHERE owner = ? AND platform = ?",
        )
        .bind(owner)
        .bind(destination.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(CredentialRow::into_credential).transpose()
    }

    async fn upsert(&self, credential: &DestinationCredential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts (
                owner, platform, access_token, refresh_token,
                expires_at, platform_user_id, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                platform_user_id = excluded.platform_user_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credential.owner)
        .bind(credential.destination.as_str())
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.account_id)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, owner: &OwnerId, destination: Destination) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM social_accounts WHERE owner = ? AND platform = ?")
                .bind(owner)
                .bind(destination.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    owner: String,
    platform: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: i64,
    platform_user_id: String,
    updated_at: i64,
}

impl CredentialRow {
    fn into_credential(self) -> Result<DestinationCredential> {
        let destination = Destination::parse(&self.platform).ok_or_else(|| {
            AppError::Database(format!("unknown platform column value: {}", self.platform))
        })?;
        Ok(DestinationCredential {
            owner: self.owner,
            destination,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            account_id: self.platform_user_id,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn store() -> SqliteCredentialStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteCredentialStore::new(pool)
    }

    fn credential(access_token: &str, expires_at: i64) -> DestinationCredential {
        DestinationCredential {
            owner: "owner-1".into(),
            destination: Destination::Tiktok,
            access_token: access_token.into(),
            refresh_token: Some("refresh-1".into()),
            expires_at,
            account_id: "open-id-1".into(),
            updated_at: 1_000,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_on_conflict() {
        let store = store().await;
        store.upsert(&credential("token-a", 10_000)).await.unwrap();
        store.upsert(&credential("token-b", 20_000)).await.unwrap();

        let loaded = store
            .get(&"owner-1".to_string(), Destination::Tiktok)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.access_token, "token-b");
        assert_eq!(loaded.expires_at, 20_000);
        assert_eq!(loaded.account_id, "open-id-1");
    }

    #[tokio::test]
    async fn get_is_scoped_per_destination() {
        let store = store().await;
        store.upsert(&credential("token-a", 10_000)).await.unwrap();

        let missing = store
            .get(&"owner-1".to_string(), Destination::Youtube)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let store = store().await;
        store.upsert(&credential("token-a", 10_000)).await.unwrap();

        assert!(store
            .delete(&"owner-1".to_string(), Destination::Tiktok)
            .await
            .unwrap());
        assert!(!store
            .delete(&"owner-1".to_string(), Destination::Tiktok)
            .await
            .unwrap());
    }
}
