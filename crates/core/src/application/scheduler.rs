// Publish scheduler: the polling loop that picks up due scheduled posts.

use crate::application::runner::JobRunner;
use crate::application::shutdown::ShutdownToken;
use crate::port::{PostStore, TimeProvider};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Upper bound on posts picked up in one tick. A backlog larger than this
/// drains over successive ticks.
const DUE_BATCH_LIMIT: i64 = 16;

/// Polls the store for posts whose `scheduled_at` has passed and runs each
/// through the shared [`JobRunner`].
///
/// Multiple scheduler instances (or a tick overlapping a slow predecessor)
/// are safe: the store's conditional claim guarantees each post executes at
/// most once, and losers skip silently.
pub struct PublishScheduler {
    store: Arc<dyn PostStore>,
    runner: Arc<JobRunner>,
    time: Arc<dyn TimeProvider>,
    poll_interval: Duration,
}

impl PublishScheduler {
    pub fn new(
        store: Arc<dyn PostStore>,
        runner: Arc<JobRunner>,
        time: Arc<dyn TimeProvider>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            runner,
            time,
            poll_interval,
        }
    }

    /// Poll until shutdown. Jobs within a tick run concurrently; the next
    /// tick waits for the batch, so at most one batch is in flight.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(poll_interval_secs = self.poll_interval.as_secs(), "scheduler started");
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.wait() => {
                    info!("scheduler stopping");
                    return;
                }
            }
        }
    }

    /// One poll cycle. Returns how many posts this instance actually
    /// executed (claim losers are not counted).
    pub async fn tick(&self) -> usize {
        let due = match self
            .store
            .find_due(self.time.now_millis(), DUE_BATCH_LIMIT)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "due-post query failed");
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }
        debug!(count = due.len(), "due posts found");

        let mut handles = Vec::with_capacity(due.len());
        for post in due {
            let runner = Arc::clone(&self.runner);
            handles.push(tokio::spawn(async move {
                match runner.claim_and_run(&post.id).await {
                    Ok(ran) => ran,
                    Err(e) => {
                        error!(post_id = %post.id, error = %e, "scheduled publish failed");
                        // The post still reached a terminal state.
                        true
                    }
                }
            }));
        }

        join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count()
    }
}
