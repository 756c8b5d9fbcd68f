// Immediate dispatch path: accept a publish request, persist it, and hand
// it to a background worker without making the caller wait for fan-out.

use crate::application::runner::JobRunner;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{Asset, Destination, OwnerId, Post, PostId};
use crate::port::{IdProvider, PostStore, TimeProvider};
use crate::{AppError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// A publish request as it arrives from the outer surface.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub owner: OwnerId,
    pub asset: Asset,
    pub caption: String,
    pub description: String,
    pub destinations: Vec<Destination>,
    /// Epoch ms. `None` publishes now via the worker; `Some` leaves the post
    /// for the scheduler.
    pub scheduled_at: Option<i64>,
}

/// Accept side: persists the post and, for immediate requests, enqueues its
/// id. Returns as soon as the row and the queue entry exist; distribution
/// happens on the worker.
pub struct DispatchQueue {
    store: Arc<dyn PostStore>,
    ids: Arc<dyn IdProvider>,
    time: Arc<dyn TimeProvider>,
    tx: mpsc::Sender<PostId>,
}

/// Drain side: runs each enqueued post through the shared runner. One worker
/// per process; jobs themselves run concurrently.
pub struct DispatchWorker {
    runner: Arc<JobRunner>,
    rx: mpsc::Receiver<PostId>,
}

impl DispatchQueue {
    pub fn with_worker(
        store: Arc<dyn PostStore>,
        ids: Arc<dyn IdProvider>,
        time: Arc<dyn TimeProvider>,
        runner: Arc<JobRunner>,
        capacity: usize,
    ) -> (DispatchQueue, DispatchWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            DispatchQueue {
                store,
                ids,
                time,
                tx,
            },
            DispatchWorker { runner, rx },
        )
    }

    /// Validate, persist, and (for immediate posts) enqueue. The returned id
    /// is usable for status polling straight away; the post is `Pending`
    /// until a worker claims it.
    pub async fn accept(&self, request: PublishRequest) -> Result<PostId> {
        let destinations = dedup(request.destinations);
        if destinations.is_empty() {
            return Err(AppError::Validation(
                "post has no destinations".to_string(),
            ));
        }
        if request.asset.refs().iter().any(|r| r.is_empty()) {
            return Err(AppError::Validation("empty asset reference".to_string()));
        }

        let post = Post::new(
            self.ids.generate_id(),
            self.time.now_millis(),
            request.owner,
            request.asset,
            request.caption,
            request.description,
            destinations,
            request.scheduled_at,
        );
        self.store.insert(&post).await?;
        info!(post_id = %post.id, owner = %post.owner, scheduled = post.scheduled_at.is_some(), "post accepted");

        if post.scheduled_at.is_none() {
            self.tx
                .send(post.id.clone())
                .await
                .map_err(|_| AppError::Internal("dispatch worker is gone".to_string()))?;
        }
        Ok(post.id)
    }
}

impl DispatchWorker {
    /// Drain the queue until shutdown. Each post runs on its own task so a
    /// slow destination never blocks the queue.
    pub async fn run(mut self, mut shutdown: ShutdownToken) {
        info!("dispatch worker started");
        loop {
            tokio::select! {
                received = self.rx.recv() => {
                    let Some(id) = received else {
                        info!("dispatch queue closed");
                        return;
                    };
                    let runner = Arc::clone(&self.runner);
                    tokio::spawn(async move {
                        if let Err(e) = runner.claim_and_run(&id).await {
                            error!(post_id = %id, error = %e, "immediate publish failed");
                        }
                    });
                }
                _ = shutdown.wait() => {
                    info!("dispatch worker stopping");
                    return;
                }
            }
        }
    }
}

fn dedup(destinations: Vec<Destination>) -> Vec<Destination> {
    let mut seen = std::collections::HashSet::new();
    destinations
        .into_iter()
        .filter(|d| seen.insert(*d))
        .collect()
}
