// Per-destination pipeline driver: walks one adapter through the publish
// state machine under the destination's overall time budget.

use crate::domain::{DestinationAuth, DestinationOutcome, DispatchError};
use crate::port::{DestinationAdapter, PostMeta, StagedAsset};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drive one destination from staging to permalink. Every failure is folded
/// into a [`DestinationOutcome::Failure`]; this function never returns an
/// error to the caller because a destination's fate is its own.
pub async fn run_destination(
    adapter: Arc<dyn DestinationAdapter>,
    auth: DestinationAuth,
    asset: Arc<StagedAsset>,
    meta: Arc<PostMeta>,
) -> DestinationOutcome {
    let destination = adapter.destination();
    let budget = destination.pipeline_budget();

    let result = tokio::time::timeout(
        budget,
        drive(adapter.as_ref(), &auth, &asset, &meta),
    )
    .await;

    match result {
        Ok(Ok((native_post_id, permalink))) => {
            info!(
                destination = %destination,
                native_post_id = %native_post_id,
                "destination published"
            );
            DestinationOutcome::Success {
                native_post_id,
                permalink,
            }
        }
        Ok(Err(error)) => {
            warn!(
                destination = %destination,
                phase = %error.phase_reached(),
                error = %error,
                "destination pipeline failed"
            );
            DestinationOutcome::Failure { error }
        }
        Err(_elapsed) => {
            warn!(destination = %destination, budget_ms = budget.as_millis() as i64, "destination pipeline timed out");
            DestinationOutcome::Failure {
                error: DispatchError::PipelineTimeout {
                    destination,
                    budget_ms: budget.as_millis() as i64,
                },
            }
        }
    }
}

async fn drive(
    adapter: &dyn DestinationAdapter,
    auth: &DestinationAuth,
    asset: &StagedAsset,
    meta: &PostMeta,
) -> Result<(String, Option<String>), DispatchError> {
    let destination = adapter.destination();

    let mut session = adapter.stage(auth, asset, meta).await?;
    debug!(destination = %destination, media_id = %session.media_id, "session staged");

    adapter.upload_bytes(auth, &mut session, asset).await?;
    debug!(destination = %destination, media_id = %session.media_id, "bytes transferred");

    adapter.await_readiness(auth, &session).await?;

    let native_post_id = adapter.finalize(auth, &session, meta).await?;
    let permalink = adapter.resolve_permalink(auth, &native_post_id).await;

    Ok((native_post_id, permalink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetKind, Destination, PublishPhase};
    use crate::port::destination::mocks::ScriptedAdapter;
    use std::path::PathBuf;

    fn auth() -> DestinationAuth {
        DestinationAuth {
            access_token: "tok".into(),
            account_id: "acct".into(),
        }
    }

    fn asset() -> Arc<StagedAsset> {
        Arc::new(StagedAsset {
            kind: AssetKind::Video,
            paths: vec![PathBuf::from("/tmp/staging/source.mp4")],
            source_refs: vec!["posts/clip.mp4".into()],
            size_bytes: 1024,
            staging_dir: PathBuf::from("/tmp/staging"),
        })
    }

    fn meta() -> Arc<PostMeta> {
        Arc::new(PostMeta {
            caption: "a caption".into(),
            description: String::new(),
        })
    }

    #[tokio::test]
    async fn full_run_yields_success_with_permalink() {
        let adapter = Arc::new(ScriptedAdapter::succeeding(
            Destination::Youtube,
            Some("https://youtu.be/abc"),
        ));
        let outcome = run_destination(adapter, auth(), asset(), meta()).await;
        match outcome {
            DestinationOutcome::Success {
                native_post_id,
                permalink,
            } => {
                assert_eq!(native_post_id, "youtube-session-post");
                assert_eq!(permalink.as_deref(), Some("https://youtu.be/abc"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stage_failure_is_captured_as_outcome() {
        let adapter = Arc::new(ScriptedAdapter::failing_at(
            Destination::Tiktok,
            PublishPhase::Init,
            DispatchError::StageFailed {
                destination: Destination::Tiktok,
                reason: "quota exhausted".into(),
            },
        ));
        let outcome = run_destination(Arc::clone(&adapter) as _, auth(), asset(), meta()).await;
        assert!(matches!(
            outcome,
            DestinationOutcome::Failure {
                error: DispatchError::StageFailed { .. }
            }
        ));
        // Nothing past stage should have been attempted.
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn readiness_failure_skips_finalize() {
        let adapter = Arc::new(ScriptedAdapter::failing_at(
            Destination::Instagram,
            PublishPhase::AwaitingProcessing,
            DispatchError::ProcessingFailed {
                destination: Destination::Instagram,
                reason: "container errored".into(),
            },
        ));
        let outcome = run_destination(Arc::clone(&adapter) as _, auth(), asset(), meta()).await;
        assert!(matches!(
            outcome,
            DestinationOutcome::Failure {
                error: DispatchError::ProcessingFailed { .. }
            }
        ));
        // stage + upload + readiness, no finalize.
        assert_eq!(adapter.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_becomes_pipeline_timeout() {
        let budget = Destination::Facebook.pipeline_budget();
        let adapter = Arc::new(
            ScriptedAdapter::succeeding(Destination::Facebook, None)
                .with_readiness_delay(budget * 2),
        );
        let outcome = run_destination(adapter, auth(), asset(), meta()).await;
        assert!(matches!(
            outcome,
            DestinationOutcome::Failure {
                error: DispatchError::PipelineTimeout { .. }
            }
        ));
    }
}
