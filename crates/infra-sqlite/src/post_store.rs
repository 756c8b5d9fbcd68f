// SQLite PostStore implementation.

use async_trait::async_trait;
use sqlx::SqlitePool;
use unipost_core::domain::{
    Asset, Destination, DestinationResults, DomainError, Post, PostId, PostStatus,
};
use unipost_core::error::{AppError, Result};
use unipost_core::port::post_store::claim_conflict;
use unipost_core::port::PostStore;

// sqlx::Error cannot get a From impl in core (orphan rules); wrap here.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    // UNIQUE constraint failed
                    "2067" | "1555" => AppError::Database(format!(
                        "unique constraint violation: {}",
                        db_err.message()
                    )),
                    // SQLITE_BUSY
                    "5" => AppError::Database(format!(
                        "database locked: {}",
                        db_err.message()
                    )),
                    _ => AppError::Database(format!(
                        "database error [{}]: {}",
                        code,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("database error: {}", db_err.message()))
            }
        }
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqlitePostStore {
    pool: SqlitePool,
}

impl SqlitePostStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for SqlitePostStore {
    async fn insert(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (
                id, owner, asset, caption, description, destinations,
                scheduled_at, status, results,
                created_at, started_at, finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner)
        .bind(serde_json::to_string(&post.asset)?)
        .bind(&post.caption)
        .bind(&post.description)
        .bind(serde_json::to_string(&post.destinations)?)
        .bind(post.scheduled_at)
        .bind(post.status.as_str())
        .bind(serde_json::to_string(&post.results)?)
        .bind(post.created_at)
        .bind(post.started_at)
        .bind(post.finished_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, PostRow>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(PostRow::into_post).transpose()
    }

    async fn find_due(&self, now_millis: i64, limit: i64) -> Result<Vec<Post>> {
        // Unscheduled posts (scheduled_at NULL) belong to the dispatch
        // queue, never to the scheduler.
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT * FROM posts
            WHERE status = 'PENDING'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= ?
            ORDER BY scheduled_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(now_millis)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(PostRow::into_post).collect()
    }

    async fn claim(&self, id: &PostId, now_millis: i64) -> Result<Post> {
        // Conditional update: exactly one racing worker flips the row.
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            UPDATE posts
            SET status = 'PROCESSING', started_at = ?
            WHERE id = ? AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(now_millis)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.into_post(),
            None => {
                let exists: Option<String> =
                    sqlx::query_scalar("SELECT status FROM posts WHERE id = ?")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;
                match exists {
                    None => Err(AppError::NotFound(format!("post {} not found", id))),
                    Some(_) => Err(claim_conflict(id)),
                }
            }
        }
    }

    async fn finish(
        &self,
        id: &PostId,
        status: PostStatus,
        results: &DestinationResults,
        finished_at: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = ?, results = ?, finished_at = ?
            WHERE id = ? AND status = 'PROCESSING'
            "#,
        )
        .bind(status.as_str())
        .bind(serde_json::to_string(results)?)
        .bind(finished_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM posts WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            return match current {
                None => Err(AppError::NotFound(format!("post {} not found", id))),
                Some(from) => Err(AppError::Domain(DomainError::InvalidStateTransition {
                    from,
                    to: status.to_string(),
                })),
            };
        }
        Ok(())
    }

    async fn count_by_status(&self, status: PostStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: String,
    owner: String,
    asset: String,
    caption: String,
    description: String,
    destinations: String,
    scheduled_at: Option<i64>,
    status: String,
    results: String,
    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
}

impl PostRow {
    fn into_post(self) -> Result<Post> {
        let status = PostStatus::parse(&self.status).ok_or_else(|| {
            AppError::Database(format!("post {} has unknown status {}", self.id, self.status))
        })?;
        let asset: Asset = serde_json::from_str(&self.asset)?;
        let destinations: Vec<Destination> = serde_json::from_str(&self.destinations)?;
        let results: DestinationResults = serde_json::from_str(&self.results)?;

        Ok(Post {
            id: self.id,
            owner: self.owner,
            asset,
            caption: self.caption,
            description: self.description,
            destinations,
            scheduled_at: self.scheduled_at,
            status,
            results,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}
