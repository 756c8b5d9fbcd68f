// Distribution engine: fan-out of one claimed post to all of its
// destinations, fan-in of the per-destination outcomes.

use crate::application::pipeline;
use crate::application::policy::{branded_caption, PolicyGate};
use crate::application::tokens::TokenLifecycleManager;
use crate::domain::{
    AssetKind, Destination, DestinationOutcome, DestinationResults, DispatchError, Post,
    PostStatus,
};
use crate::port::{DestinationAdapter, MediaStore, PostMeta, StagedAsset, Transcoder};
use crate::Result;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// The registered adapters, one per destination the deployment supports.
#[derive(Default, Clone)]
pub struct AdapterSet {
    adapters: HashMap<Destination, Arc<dyn DestinationAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn DestinationAdapter>) -> Self {
        self.adapters.insert(adapter.destination(), adapter);
        self
    }

    pub fn get(&self, destination: Destination) -> Option<Arc<dyn DestinationAdapter>> {
        self.adapters.get(&destination).cloned()
    }
}

/// Aggregated result of one distribution run.
#[derive(Debug, Clone)]
pub struct DistributionReport {
    pub status: PostStatus,
    pub results: DestinationResults,
}

/// Fans one post out to its destinations concurrently and folds the
/// outcomes back into a terminal status.
///
/// Failures inside a destination pipeline never cross over: they land in the
/// result map while sibling pipelines keep running. Only pre-flight failures
/// (policy, staging) abort the whole run.
pub struct DistributionEngine {
    adapters: AdapterSet,
    tokens: Arc<TokenLifecycleManager>,
    policy: PolicyGate,
    media: Arc<dyn MediaStore>,
    transcoder: Arc<dyn Transcoder>,
}

impl DistributionEngine {
    pub fn new(
        adapters: AdapterSet,
        tokens: Arc<TokenLifecycleManager>,
        policy: PolicyGate,
        media: Arc<dyn MediaStore>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            adapters,
            tokens,
            policy,
            media,
            transcoder,
        }
    }

    /// Run the full fan-out for a claimed post. `staging_dir` is namespaced
    /// by post id so concurrent jobs never share files.
    pub async fn distribute(&self, post: &Post, staging_dir: &Path) -> Result<DistributionReport> {
        let profile = self.policy.authorize(post).await?;

        let mut staged = self.media.materialize(post, staging_dir).await?;
        if profile.require_watermark && staged.kind == AssetKind::Video {
            self.apply_watermark(&mut staged).await;
        }

        let meta = Arc::new(PostMeta {
            caption: branded_caption(&post.caption, &profile),
            description: post.description.clone(),
        });
        let staged = Arc::new(staged);

        info!(
            post_id = %post.id,
            destinations = post.destinations.len(),
            kind = %staged.kind,
            "fanning out"
        );

        let mut handles = Vec::with_capacity(post.destinations.len());
        for &destination in &post.destinations {
            let tokens = Arc::clone(&self.tokens);
            let adapter = self.adapters.get(destination);
            let owner = post.owner.clone();
            let staged = Arc::clone(&staged);
            let meta = Arc::clone(&meta);

            handles.push(tokio::spawn(async move {
                let outcome = match adapter {
                    None => DestinationOutcome::Failure {
                        error: DispatchError::StageFailed {
                            destination,
                            reason: "no adapter registered".into(),
                        },
                    },
                    Some(adapter) => {
                        match tokens.get_valid_credential(&owner, destination).await {
                            Err(error) => DestinationOutcome::Failure { error },
                            Ok(auth) => {
                                pipeline::run_destination(adapter, auth, staged, meta).await
                            }
                        }
                    }
                };
                (destination, outcome)
            }));
        }

        let mut results = DestinationResults::new();
        for (handle, &destination) in join_all(handles).await.into_iter().zip(&post.destinations)
        {
            match handle {
                Ok((destination, outcome)) => {
                    results.insert(destination, outcome);
                }
                // A panicking adapter must not take the whole post down.
                Err(join_error) => {
                    warn!(destination = %destination, error = %join_error, "destination task aborted");
                    results.insert(
                        destination,
                        DestinationOutcome::Failure {
                            error: DispatchError::PublishFailed {
                                destination,
                                reason: "worker task aborted".into(),
                            },
                        },
                    );
                }
            }
        }

        self.cleanup(post, &staged, &results).await;

        let status = Post::status_for_results(&results);
        info!(post_id = %post.id, status = %status, "fan-in complete");
        Ok(DistributionReport { status, results })
    }

    /// Watermark is applied once before fan-out, never per destination.
    /// Best-effort: a failing transcode publishes the original.
    async fn apply_watermark(&self, staged: &mut StagedAsset) {
        let input = staged.primary_path().to_path_buf();
        let output = staged.staging_dir.join("watermarked.mp4");
        match self.transcoder.watermark(&input, &output).await {
            Ok(path) => {
                if let Ok(md) = tokio::fs::metadata(&path).await {
                    staged.size_bytes = md.len();
                }
                staged.paths[0] = path;
            }
            Err(e) => {
                warn!(error = %e, "watermark failed, publishing original");
            }
        }
    }

    async fn cleanup(&self, post: &Post, staged: &StagedAsset, results: &DestinationResults) {
        if let Err(e) = self.media.remove_staged(&staged.staging_dir).await {
            warn!(post_id = %post.id, error = %e, "staging cleanup failed");
        }
        // Durable copies are only dropped once every destination has them.
        if Post::status_for_results(results) == PostStatus::Published {
            if let Err(e) = self.media.remove_remote(post).await {
                warn!(post_id = %post.id, error = %e, "remote cleanup failed");
            }
        }
    }
}
