// Post entity: one staged media asset distributed to N destinations.

use super::destination::{Destination, DestinationResults};
use serde::{Deserialize, Serialize};

/// Post ID (UUID v4).
pub type PostId = String;

/// Owner ID as issued by the external auth layer.
pub type OwnerId = String;

/// Post lifecycle.
///
/// Transitions are strictly `Pending -> Processing -> terminal`. The claim
/// into `Processing` is exclusive: once a worker owns the post, a second
/// claim must fail at the store layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    Pending,
    Processing,
    Published,
    PartiallyPublished,
    Failed,
}

impl PostStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PostStatus::Published | PostStatus::PartiallyPublished | PostStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "PENDING",
            PostStatus::Processing => "PROCESSING",
            PostStatus::Published => "PUBLISHED",
            PostStatus::PartiallyPublished => "PARTIALLY_PUBLISHED",
            PostStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<PostStatus> {
        match s {
            "PENDING" => Some(PostStatus::Pending),
            "PROCESSING" => Some(PostStatus::Processing),
            "PUBLISHED" => Some(PostStatus::Published),
            "PARTIALLY_PUBLISHED" => Some(PostStatus::PartiallyPublished),
            "FAILED" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse asset kind, used by adapters to reject what they cannot publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Video,
    PhotoSet,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Video => f.write_str("video"),
            AssetKind::PhotoSet => f.write_str("photo_set"),
        }
    }
}

/// Reference to the media in durable storage, prior to local staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Asset {
    Video { path: String },
    PhotoSet { paths: Vec<String> },
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::Video { .. } => AssetKind::Video,
            Asset::PhotoSet { .. } => AssetKind::PhotoSet,
        }
    }

    pub fn refs(&self) -> Vec<&str> {
        match self {
            Asset::Video { path } => vec![path.as_str()],
            Asset::PhotoSet { paths } => paths.iter().map(String::as_str).collect(),
        }
    }
}

/// Publish job entity. Owned by the store; the scheduler mutates it on claim
/// and the distribution engine writes the terminal status and result map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub owner: OwnerId,
    pub asset: Asset,
    pub caption: String,
    pub description: String,
    pub destinations: Vec<Destination>,

    /// Epoch ms. `None` means immediate dispatch via the accept channel.
    pub scheduled_at: Option<i64>,

    pub status: PostStatus,
    pub results: DestinationResults,

    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl Post {
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        owner: impl Into<String>,
        asset: Asset,
        caption: impl Into<String>,
        description: impl Into<String>,
        destinations: Vec<Destination>,
        scheduled_at: Option<i64>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            asset,
            caption: caption.into(),
            description: description.into(),
            destinations,
            scheduled_at,
            status: PostStatus::Pending,
            results: DestinationResults::new(),
            created_at,
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition to Processing. The exclusive-claim guarantee itself lives
    /// in the store's conditional update; this guard catches misuse of an
    /// already-loaded entity.
    pub fn claim(&mut self, now_millis: i64) -> super::error::Result<()> {
        if self.status != PostStatus::Pending {
            return Err(super::error::DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: PostStatus::Processing.to_string(),
            });
        }
        self.status = PostStatus::Processing;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to a terminal status with the aggregated result map.
    pub fn finish(
        &mut self,
        status: PostStatus,
        results: DestinationResults,
        now_millis: i64,
    ) -> super::error::Result<()> {
        if self.status != PostStatus::Processing || !status.is_terminal() {
            return Err(super::error::DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        self.results = results;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Fold a result map into the terminal status: all succeeded =>
    /// Published, none => Failed, mixed => PartiallyPublished.
    pub fn status_for_results(results: &DestinationResults) -> PostStatus {
        let total = results.len();
        let succeeded = results.values().filter(|o| o.is_success()).count();
        if total == 0 || succeeded == 0 {
            PostStatus::Failed
        } else if succeeded == total {
            PostStatus::Published
        } else {
            PostStatus::PartiallyPublished
        }
    }

    /// Test helper with deterministic IDs and timestamps (test-1, test-2, ...).
    #[doc(hidden)]
    pub fn new_test(
        owner: impl Into<String>,
        asset: Asset,
        destinations: Vec<Destination>,
        scheduled_at: Option<i64>,
    ) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            (counter * 1000) as i64,
            owner,
            asset,
            "caption",
            "description",
            destinations,
            scheduled_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::destination::{DestinationOutcome, DispatchError};
    use super::*;

    fn video_post() -> Post {
        Post::new_test(
            "owner-1",
            Asset::Video {
                path: "posts/clip.mp4".into(),
            },
            vec![Destination::Tiktok, Destination::Youtube],
            None,
        )
    }

    #[test]
    fn claim_moves_pending_to_processing() {
        let mut post = video_post();
        post.claim(42).unwrap();
        assert_eq!(post.status, PostStatus::Processing);
        assert_eq!(post.started_at, Some(42));
    }

    #[test]
    fn double_claim_is_rejected() {
        let mut post = video_post();
        post.claim(42).unwrap();
        assert!(post.claim(43).is_err());
    }

    #[test]
    fn finish_requires_processing_and_terminal_target() {
        let mut post = video_post();
        // Not claimed yet
        assert!(post
            .finish(PostStatus::Published, DestinationResults::new(), 1)
            .is_err());

        post.claim(1).unwrap();
        // Pending is not a terminal target
        assert!(post
            .finish(PostStatus::Pending, DestinationResults::new(), 2)
            .is_err());

        post.finish(PostStatus::Failed, DestinationResults::new(), 3)
            .unwrap();
        assert_eq!(post.finished_at, Some(3));
    }

    #[test]
    fn status_folding_covers_all_outcomes() {
        let ok = DestinationOutcome::Success {
            native_post_id: "1".into(),
            permalink: None,
        };
        let err = DestinationOutcome::Failure {
            error: DispatchError::CredentialMissing {
                destination: Destination::Tiktok,
            },
        };

        let mut results = DestinationResults::new();
        assert_eq!(Post::status_for_results(&results), PostStatus::Failed);

        results.insert(Destination::Youtube, ok.clone());
        assert_eq!(Post::status_for_results(&results), PostStatus::Published);

        results.insert(Destination::Tiktok, err.clone());
        assert_eq!(
            Post::status_for_results(&results),
            PostStatus::PartiallyPublished
        );

        results.insert(Destination::Youtube, err);
        assert_eq!(Post::status_for_results(&results), PostStatus::Failed);
    }
}
