// Job runner: the claim-execute-finish wrapper shared by the scheduler and
// the immediate dispatch path.

use crate::application::engine::DistributionEngine;
use crate::domain::{DestinationResults, PostId, PostStatus};
use crate::port::{PostStore, TimeProvider};
use crate::{AppError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Claims a post, runs the distribution engine on it, and writes the
/// terminal status back. One instance is shared by every execution path so
/// the claim discipline is identical everywhere.
pub struct JobRunner {
    store: Arc<dyn PostStore>,
    engine: Arc<DistributionEngine>,
    time: Arc<dyn TimeProvider>,
    staging_root: PathBuf,
}

impl JobRunner {
    pub fn new(
        store: Arc<dyn PostStore>,
        engine: Arc<DistributionEngine>,
        time: Arc<dyn TimeProvider>,
        staging_root: PathBuf,
    ) -> Self {
        Self {
            store,
            engine,
            time,
            staging_root,
        }
    }

    /// Claim and execute one post. Returns `Ok(false)` when another worker
    /// holds the claim (not an error: overlapping ticks race by design).
    /// Pre-flight failures mark the post Failed before the error surfaces.
    pub async fn claim_and_run(&self, id: &PostId) -> Result<bool> {
        let post = match self.store.claim(id, self.time.now_millis()).await {
            Ok(post) => post,
            Err(e) if e.is_claim_conflict() => {
                info!(post_id = %id, "post already claimed, skipping");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        info!(post_id = %id, owner = %post.owner, "post claimed");
        let staging_dir = self.staging_root.join(&post.id);

        match self.engine.distribute(&post, &staging_dir).await {
            Ok(report) => {
                self.store
                    .finish(
                        id,
                        report.status,
                        &report.results,
                        self.time.now_millis(),
                    )
                    .await?;
                Ok(true)
            }
            Err(e) => {
                warn!(post_id = %id, error = %e, "distribution aborted before fan-out");
                self.mark_failed(id).await;
                Err(e)
            }
        }
    }

    /// Look a post up before running it, for the immediate dispatch path
    /// where the caller only has an id fresh from `insert`.
    pub async fn run_existing(&self, id: &PostId) -> Result<bool> {
        match self.store.find_by_id(id).await? {
            Some(_) => self.claim_and_run(id).await,
            None => Err(AppError::NotFound(format!("post {} not found", id))),
        }
    }

    async fn mark_failed(&self, id: &PostId) {
        let write = self
            .store
            .finish(
                id,
                PostStatus::Failed,
                &DestinationResults::new(),
                self.time.now_millis(),
            )
            .await;
        if let Err(e) = write {
            warn!(post_id = %id, error = %e, "failed to record terminal failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::AdapterSet;
    use crate::application::policy::PolicyGate;
    use crate::application::tokens::TokenLifecycleManager;
    use crate::domain::{Asset, Destination, DestinationCredential, Post, Tier};
    use crate::port::credential_store::mocks::MemoryCredentialStore;
    use crate::port::destination::mocks::ScriptedAdapter;
    use crate::port::media_store::mocks::FakeMediaStore;
    use crate::port::post_store::mocks::MemoryPostStore;
    use crate::port::providers::mocks::FixedClock;
    use crate::port::subscription_store::mocks::MemorySubscriptionStore;
    use crate::port::transcoder::mocks::RecordingTranscoder;
    use crate::port::CredentialStore;
    use std::collections::HashMap;

    const NOW: i64 = 1_700_000_000_000;

    async fn runner_with(store: Arc<MemoryPostStore>, tier: Tier) -> JobRunner {
        let credentials = Arc::new(MemoryCredentialStore::new());
        credentials
            .upsert(&DestinationCredential {
                owner: "owner-1".into(),
                destination: Destination::Youtube,
                access_token: "tok".into(),
                refresh_token: None,
                expires_at: NOW + 90 * 24 * 60 * 60 * 1000,
                account_id: "acct".into(),
                updated_at: NOW,
            })
            .await
            .unwrap();

        let engine = Arc::new(DistributionEngine::new(
            AdapterSet::new().register(Arc::new(ScriptedAdapter::succeeding(
                Destination::Youtube,
                None,
            ))),
            Arc::new(TokenLifecycleManager::new(
                credentials,
                HashMap::new(),
                Arc::new(FixedClock::at(NOW)),
            )),
            PolicyGate::new(Arc::new(MemorySubscriptionStore::with("owner-1", tier))),
            Arc::new(FakeMediaStore::new()),
            Arc::new(RecordingTranscoder::new()),
        ));

        JobRunner::new(
            store,
            engine,
            Arc::new(FixedClock::at(NOW)),
            PathBuf::from("/tmp/unipost-runner-test"),
        )
    }

    fn pending_post() -> Post {
        Post::new_test(
            "owner-1",
            Asset::Video {
                path: "posts/clip.mp4".into(),
            },
            vec![Destination::Youtube],
            None,
        )
    }

    #[tokio::test]
    async fn runs_a_pending_post_to_published() {
        let store = Arc::new(MemoryPostStore::new());
        let post = pending_post();
        store.insert(&post).await.unwrap();

        let runner = runner_with(Arc::clone(&store), Tier::Pro).await;
        assert!(runner.claim_and_run(&post.id).await.unwrap());

        let stored = store.find_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert_eq!(stored.finished_at, Some(NOW));
        assert!(stored.results[&Destination::Youtube].is_success());
    }

    #[tokio::test]
    async fn claim_conflict_is_a_silent_skip() {
        let store = Arc::new(MemoryPostStore::new());
        let post = pending_post();
        store.insert(&post).await.unwrap();
        store.claim(&post.id, NOW).await.unwrap();

        let runner = runner_with(Arc::clone(&store), Tier::Pro).await;
        assert!(!runner.claim_and_run(&post.id).await.unwrap());
        assert!(store.finish_writes().is_empty());
    }

    #[tokio::test]
    async fn preflight_failure_marks_post_failed() {
        let store = Arc::new(MemoryPostStore::new());
        let mut post = pending_post();
        // Free tier cannot schedule, so policy aborts before fan-out.
        post.scheduled_at = Some(NOW);
        store.insert(&post).await.unwrap();

        let runner = runner_with(Arc::clone(&store), Tier::Free).await;
        assert!(runner.claim_and_run(&post.id).await.is_err());

        let stored = store.find_by_id(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_post_is_not_found() {
        let store = Arc::new(MemoryPostStore::new());
        let runner = runner_with(store, Tier::Pro).await;
        let err = runner
            .run_existing(&"missing".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
