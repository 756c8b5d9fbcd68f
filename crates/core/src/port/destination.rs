// Destination adapter port: the generalized upload/publish contract every
// platform implementation satisfies.

use crate::domain::{AssetKind, Destination, DestinationAuth, DispatchError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A locally-staged asset, ready for byte transfer.
#[derive(Debug, Clone)]
pub struct StagedAsset {
    pub kind: AssetKind,
    /// Local files, one entry for a video, N for a photo set.
    pub paths: Vec<PathBuf>,
    /// The durable-storage references the files came from. Photo publishing
    /// on Meta surfaces goes by URL rather than byte push, so adapters that
    /// need them get the originals.
    pub source_refs: Vec<String>,
    /// Size of the primary file in bytes.
    pub size_bytes: u64,
    /// Job-namespaced staging directory holding `paths`.
    pub staging_dir: PathBuf,
}

impl StagedAsset {
    pub fn primary_path(&self) -> &Path {
        // Materialization guarantees at least one file.
        self.paths
            .first()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(""))
    }
}

/// Caption/title metadata applied during staging and finalize. Destinations
/// disagree about when text is attached (TikTok and YouTube at init,
/// LinkedIn at post creation), so both phases receive it.
#[derive(Debug, Clone)]
pub struct PostMeta {
    pub caption: String,
    pub description: String,
}

/// One byte range the destination asked us to upload to a specific URL
/// (LinkedIn hands these out; others use uniform chunking).
#[derive(Debug, Clone)]
pub struct ByteRange {
    pub first: u64,
    pub last: u64,
    pub upload_url: String,
}

/// Open upload session/container on a destination. The fields are a union of
/// what the five protocols need; each adapter fills what applies.
#[derive(Debug, Clone, Default)]
pub struct UploadSession {
    /// publish_id / container id / video URN / video id / session handle.
    pub media_id: String,
    pub upload_url: Option<String>,
    pub upload_token: Option<String>,
    /// Destination-dictated part ranges (LinkedIn).
    pub byte_ranges: Vec<ByteRange>,
    /// Part receipts collected during upload (ETags, photo ids).
    pub part_tags: Vec<String>,
}

/// The per-destination publish protocol, expressed as the fixed state
/// machine `Init -> Staged -> Uploading -> AwaitingProcessing -> Published`.
///
/// Implementations must return typed [`DispatchError`]s rather than panic:
/// the engine folds them into the result map and keeps driving siblings.
/// Adapters never refresh tokens themselves; `auth` arrives pre-validated
/// from the token lifecycle manager.
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    fn destination(&self) -> Destination;

    /// Open an upload session/container for the asset.
    async fn stage(
        &self,
        auth: &DestinationAuth,
        asset: &StagedAsset,
        meta: &PostMeta,
    ) -> Result<UploadSession, DispatchError>;

    /// Transfer the asset bytes, chunked per destination limits, with a
    /// bounded per-chunk retry budget.
    async fn upload_bytes(
        &self,
        auth: &DestinationAuth,
        session: &mut UploadSession,
        asset: &StagedAsset,
    ) -> Result<(), DispatchError>;

    /// Poll until the destination's ingest pipeline reports the asset ready,
    /// within the destination's readiness budget. Transient error statuses
    /// are retried a bounded number of times before being declared fatal.
    async fn await_readiness(
        &self,
        auth: &DestinationAuth,
        session: &UploadSession,
    ) -> Result<(), DispatchError>;

    /// Flip visibility to published; returns the native post id.
    async fn finalize(
        &self,
        auth: &DestinationAuth,
        session: &UploadSession,
        meta: &PostMeta,
    ) -> Result<String, DispatchError>;

    /// Best-effort permalink lookup. `None` is a legitimate outcome.
    async fn resolve_permalink(
        &self,
        auth: &DestinationAuth,
        native_post_id: &str,
    ) -> Option<String>;
}

/// Reject photo sets on video-only destinations.
pub fn require_video(
    destination: Destination,
    asset: &StagedAsset,
) -> Result<(), DispatchError> {
    if asset.kind != AssetKind::Video {
        return Err(DispatchError::Unsupported {
            destination,
            kind: asset.kind,
        });
    }
    Ok(())
}

// ============================================================================
// Scripted adapter for engine/scheduler tests
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::PublishPhase;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Adapter that succeeds or fails at a scripted phase, counting every
    /// method invocation so tests can assert "zero adapter calls".
    pub struct ScriptedAdapter {
        destination: Destination,
        fail_at: Option<(PublishPhase, DispatchError)>,
        permalink: Option<String>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedAdapter {
        pub fn succeeding(destination: Destination, permalink: Option<&str>) -> Self {
            Self {
                destination,
                fail_at: None,
                permalink: permalink.map(str::to_string),
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn failing_at(
            destination: Destination,
            phase: PublishPhase,
            error: DispatchError,
        ) -> Self {
            Self {
                fail_at: Some((phase, error)),
                ..Self::succeeding(destination, None)
            }
        }

        /// Sleep in `await_readiness`, for timeout-path tests.
        pub fn with_readiness_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn call_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn check(&self, phase: PublishPhase) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((fail_phase, error)) = &self.fail_at {
                if *fail_phase == phase {
                    return Err(error.clone());
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DestinationAdapter for ScriptedAdapter {
        fn destination(&self) -> Destination {
            self.destination
        }

        async fn stage(
            &self,
            _auth: &DestinationAuth,
            _asset: &StagedAsset,
            _meta: &PostMeta,
        ) -> Result<UploadSession, DispatchError> {
            self.check(PublishPhase::Init)?;
            Ok(UploadSession {
                media_id: format!("{}-session", self.destination),
                ..UploadSession::default()
            })
        }

        async fn upload_bytes(
            &self,
            _auth: &DestinationAuth,
            _session: &mut UploadSession,
            _asset: &StagedAsset,
        ) -> Result<(), DispatchError> {
            self.check(PublishPhase::Uploading)
        }

        async fn await_readiness(
            &self,
            _auth: &DestinationAuth,
            _session: &UploadSession,
        ) -> Result<(), DispatchError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.check(PublishPhase::AwaitingProcessing)
        }

        async fn finalize(
            &self,
            _auth: &DestinationAuth,
            session: &UploadSession,
            _meta: &PostMeta,
        ) -> Result<String, DispatchError> {
            self.check(PublishPhase::Published)?;
            Ok(format!("{}-post", session.media_id))
        }

        async fn resolve_permalink(
            &self,
            _auth: &DestinationAuth,
            _native_post_id: &str,
        ) -> Option<String> {
            self.permalink.clone()
        }
    }
}
