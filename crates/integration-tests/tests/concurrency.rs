//! Concurrency guarantees at the SQL layer: exclusive claims under racing
//! workers, scheduler-driven runs, and the immediate dispatch path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use unipost_core::application::{
    AdapterSet, DispatchQueue, DistributionEngine, JobRunner, PolicyGate, PublishRequest,
    PublishScheduler, TokenLifecycleManager,
};
use unipost_core::domain::{
    Asset, Destination, DestinationCredential, Post, PostStatus, Tier,
};
use unipost_core::port::destination::mocks::ScriptedAdapter;
use unipost_core::port::media_store::mocks::FakeMediaStore;
use unipost_core::port::token_refresher::mocks::CountingRefresher;
use unipost_core::port::transcoder::mocks::RecordingTranscoder;
use unipost_core::port::{CredentialStore, PostStore, SystemTimeProvider, TimeProvider, UuidProvider};
use unipost_infra_sqlite::{
    create_pool, run_migrations, SqliteCredentialStore, SqlitePostStore, SqliteSubscriptionStore,
};

struct Stack {
    store: Arc<SqlitePostStore>,
    runner: Arc<JobRunner>,
    _staging_root: TempDir,
}

/// Full stack over in-memory SQLite with scripted adapters for every
/// destination. Staging uses the fake media store, so no asset files are
/// needed on disk.
async fn stack(owner: &str) -> Stack {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let time = Arc::new(SystemTimeProvider);
    let now = time.now_millis();

    let credentials = Arc::new(SqliteCredentialStore::new(pool.clone()));
    let subscriptions = Arc::new(SqliteSubscriptionStore::new(pool.clone()));
    subscriptions
        .set_tier(&owner.to_string(), Tier::Elite, now)
        .await
        .unwrap();

    let mut refreshers: HashMap<Destination, Arc<dyn unipost_core::port::TokenRefresher>> =
        HashMap::new();
    let mut adapters = AdapterSet::new();
    for &destination in Destination::ALL.iter() {
        refreshers.insert(destination, Arc::new(CountingRefresher::new(destination)));
        adapters = adapters.register(Arc::new(ScriptedAdapter::succeeding(destination, None)));
        credentials
            .upsert(&DestinationCredential {
                owner: owner.to_string(),
                destination,
                access_token: format!("{}-token", destination),
                refresh_token: Some("refresh".into()),
                expires_at: now + 30 * 24 * 60 * 60 * 1000,
                account_id: format!("{}-account", destination),
                updated_at: now,
            })
            .await
            .unwrap();
    }

    let tokens = Arc::new(TokenLifecycleManager::new(
        credentials,
        refreshers,
        time.clone(),
    ));
    let engine = Arc::new(DistributionEngine::new(
        adapters,
        tokens,
        PolicyGate::new(subscriptions),
        Arc::new(FakeMediaStore::new()),
        Arc::new(RecordingTranscoder::new()),
    ));

    let staging_root = TempDir::new().unwrap();
    let store = Arc::new(SqlitePostStore::new(pool));
    let runner = Arc::new(JobRunner::new(
        store.clone(),
        engine,
        time,
        staging_root.path().to_path_buf(),
    ));

    Stack {
        store,
        runner,
        _staging_root: staging_root,
    }
}

fn video_post(owner: &str, scheduled_at: Option<i64>) -> Post {
    Post::new_test(
        owner,
        Asset::Video {
            path: "clip.mp4".into(),
        },
        vec![Destination::Youtube, Destination::Tiktok],
        scheduled_at,
    )
}

#[tokio::test]
async fn racing_workers_claim_a_post_exactly_once() {
    let stack = stack("owner-1").await;
    let post = video_post("owner-1", Some(1_000));
    stack.store.insert(&post).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = stack.store.clone();
        let id = post.id.clone();
        handles.push(tokio::spawn(async move { store.claim(&id, 42).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(claimed) => {
                assert_eq!(claimed.status, PostStatus::Processing);
                winners += 1;
            }
            Err(e) => assert!(e.is_claim_conflict()),
        }
    }
    assert_eq!(winners, 1, "exactly one worker may claim the post");
}

#[tokio::test]
async fn racing_runners_publish_a_post_exactly_once() {
    let stack = stack("owner-1").await;
    let post = video_post("owner-1", Some(1_000));
    stack.store.insert(&post).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let runner = stack.runner.clone();
        let id = post.id.clone();
        handles.push(tokio::spawn(async move { runner.claim_and_run(&id).await }));
    }

    let mut ran = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            ran += 1;
        }
    }
    assert_eq!(ran, 1);

    let stored = stack.store.find_by_id(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Published);
    assert_eq!(stored.results.len(), 2);
}

#[tokio::test]
async fn scheduler_tick_publishes_due_posts_only() {
    let stack = stack("owner-1").await;
    let time = Arc::new(SystemTimeProvider);
    let now = time.now_millis();

    let due = video_post("owner-1", Some(now - 1_000));
    let future = video_post("owner-1", Some(now + 60 * 60 * 1000));
    let immediate = video_post("owner-1", None);
    for p in [&due, &future, &immediate] {
        stack.store.insert(p).await.unwrap();
    }

    let scheduler = PublishScheduler::new(
        stack.store.clone(),
        stack.runner.clone(),
        time,
        Duration::from_secs(5),
    );
    assert_eq!(scheduler.tick().await, 1);

    let published = stack.store.find_by_id(&due.id).await.unwrap().unwrap();
    assert_eq!(published.status, PostStatus::Published);
    for untouched in [&future.id, &immediate.id] {
        let stored = stack.store.find_by_id(untouched).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Pending);
    }
}

#[tokio::test]
async fn immediate_dispatch_runs_through_the_worker() {
    let stack = stack("owner-1").await;
    let time: Arc<SystemTimeProvider> = Arc::new(SystemTimeProvider);

    let (queue, worker) = DispatchQueue::with_worker(
        stack.store.clone(),
        Arc::new(UuidProvider),
        time,
        stack.runner.clone(),
        8,
    );
    let (shutdown_tx, shutdown_rx) = unipost_core::application::shutdown_channel();
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let id = queue
        .accept(PublishRequest {
            owner: "owner-1".into(),
            asset: Asset::Video {
                path: "clip.mp4".into(),
            },
            caption: "hello".into(),
            description: "world".into(),
            destinations: vec![Destination::Youtube],
            scheduled_at: None,
        })
        .await
        .unwrap();

    // Poll until the worker drives the post to a terminal status.
    let mut status = PostStatus::Pending;
    for _ in 0..100 {
        status = stack.store.find_by_id(&id).await.unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, PostStatus::Published);

    shutdown_tx.shutdown();
    drop(queue);
    let _ = worker_handle.await;
}
