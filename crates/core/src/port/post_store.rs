// Post store port.

use crate::domain::{DestinationResults, Post, PostId, PostStatus};
use crate::error::{AppError, Result};
use async_trait::async_trait;

/// Persistence interface for posts.
///
/// `claim` is the correctness-critical operation: it must be a conditional
/// `Pending -> Processing` transition (compare-and-swap on the current
/// status), so two workers racing for the same post get exactly one winner.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, post: &Post) -> Result<()>;

    async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>>;

    /// Posts with `status = Pending` and `scheduled_at <= now`, oldest first.
    async fn find_due(&self, now_millis: i64, limit: i64) -> Result<Vec<Post>>;

    /// Exclusively claim a Pending post. Returns the claimed post, or
    /// `AppError::ClaimConflict` when another worker got there first (the
    /// caller skips silently), or `AppError::NotFound`.
    async fn claim(&self, id: &PostId, now_millis: i64) -> Result<Post>;

    /// Write the terminal status and the aggregated result map. Guarded on
    /// the post currently being Processing.
    async fn finish(
        &self,
        id: &PostId,
        status: PostStatus,
        results: &DestinationResults,
        finished_at: i64,
    ) -> Result<()>;

    async fn count_by_status(&self, status: PostStatus) -> Result<i64>;
}

/// Shared claim-conflict error constructor so the SQLite store and the
/// in-memory mock report identically.
pub fn claim_conflict(id: &PostId) -> AppError {
    AppError::ClaimConflict(format!("post {} is not pending", id))
}

// ============================================================================
// In-memory implementation for tests
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store with the same claim semantics as the SQLite store.
    #[derive(Default)]
    pub struct MemoryPostStore {
        posts: Mutex<HashMap<PostId, Post>>,
        finish_writes: Mutex<Vec<(PostId, PostStatus)>>,
    }

    impl MemoryPostStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Terminal status writes in order, for exclusivity assertions.
        pub fn finish_writes(&self) -> Vec<(PostId, PostStatus)> {
            self.finish_writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PostStore for MemoryPostStore {
        async fn insert(&self, post: &Post) -> Result<()> {
            self.posts
                .lock()
                .unwrap()
                .insert(post.id.clone(), post.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &PostId) -> Result<Option<Post>> {
            Ok(self.posts.lock().unwrap().get(id).cloned())
        }

        async fn find_due(&self, now_millis: i64, limit: i64) -> Result<Vec<Post>> {
            let posts = self.posts.lock().unwrap();
            let mut due: Vec<Post> = posts
                .values()
                .filter(|p| {
                    p.status == PostStatus::Pending
                        && p.scheduled_at.is_some_and(|at| at <= now_millis)
                })
                .cloned()
                .collect();
            due.sort_by_key(|p| p.scheduled_at);
            due.truncate(limit as usize);
            Ok(due)
        }

        async fn claim(&self, id: &PostId, now_millis: i64) -> Result<Post> {
            let mut posts = self.posts.lock().unwrap();
            let post = posts
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("post {} not found", id)))?;
            if post.status != PostStatus::Pending {
                return Err(claim_conflict(id));
            }
            post.claim(now_millis)?;
            Ok(post.clone())
        }

        async fn finish(
            &self,
            id: &PostId,
            status: PostStatus,
            results: &DestinationResults,
            finished_at: i64,
        ) -> Result<()> {
            let mut posts = self.posts.lock().unwrap();
            let post = posts
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("post {} not found", id)))?;
            post.finish(status, results.clone(), finished_at)?;
            self.finish_writes
                .lock()
                .unwrap()
                .push((id.clone(), status));
            Ok(())
        }

        async fn count_by_status(&self, status: PostStatus) -> Result<i64> {
            Ok(self
                .posts
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.status == status)
                .count() as i64)
        }
    }
}
