// Destination vocabulary: the closed platform set, the generalized publish
// state machine phases, and the per-destination error taxonomy.

use super::post::AssetKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// A remote publish target. The set is fixed at build time; adding a platform
/// means adding a variant and an adapter, not registering a plugin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Youtube,
    Tiktok,
    Instagram,
    Facebook,
    Linkedin,
}

impl Destination {
    pub const ALL: [Destination; 5] = [
        Destination::Youtube,
        Destination::Tiktok,
        Destination::Instagram,
        Destination::Facebook,
        Destination::Linkedin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Youtube => "youtube",
            Destination::Tiktok => "tiktok",
            Destination::Instagram => "instagram",
            Destination::Facebook => "facebook",
            Destination::Linkedin => "linkedin",
        }
    }

    pub fn parse(s: &str) -> Option<Destination> {
        match s {
            "youtube" => Some(Destination::Youtube),
            "tiktok" => Some(Destination::Tiktok),
            "instagram" => Some(Destination::Instagram),
            "facebook" => Some(Destination::Facebook),
            "linkedin" => Some(Destination::Linkedin),
            _ => None,
        }
    }

    /// Safety margin before `expires_at` that triggers a proactive token
    /// refresh. Short-lived tokens (Google, TikTok) refresh minutes ahead;
    /// 60-day tokens refresh days ahead so a dormant account never publishes
    /// with a token about to lapse.
    pub fn refresh_margin_ms(&self) -> i64 {
        const MINUTE: i64 = 60 * 1000;
        const DAY: i64 = 24 * 60 * MINUTE;
        match self {
            Destination::Youtube | Destination::Tiktok => 5 * MINUTE,
            Destination::Instagram => 15 * DAY,
            Destination::Facebook | Destination::Linkedin => 5 * DAY,
        }
    }

    /// Interval between readiness polls while the destination ingests the
    /// uploaded asset.
    pub fn poll_interval(&self) -> Duration {
        match self {
            Destination::Youtube => Duration::from_secs(10),
            _ => Duration::from_secs(5),
        }
    }

    /// Total time allowed in `AwaitingProcessing` before the pipeline gives
    /// up on this destination.
    pub fn readiness_budget(&self) -> Duration {
        match self {
            Destination::Youtube => Duration::from_secs(240),
            Destination::Instagram => Duration::from_secs(150),
            Destination::Linkedin | Destination::Tiktok => Duration::from_secs(120),
            Destination::Facebook => Duration::from_secs(60),
        }
    }

    /// Overall budget for one destination pipeline, staging through permalink.
    /// Exceeding it fails this destination only, never the sibling pipelines.
    pub fn pipeline_budget(&self) -> Duration {
        match self {
            Destination::Youtube => Duration::from_secs(15 * 60),
            _ => Duration::from_secs(10 * 60),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phases of the generalized upload state machine. Every adapter is driven
/// through these in order; `Failed` is reachable from any of them and is
/// represented by the [`DispatchError`] a phase returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPhase {
    Init,
    Staged,
    Uploading,
    AwaitingProcessing,
    Published,
}

impl std::fmt::Display for PublishPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PublishPhase::Init => "init",
            PublishPhase::Staged => "staged",
            PublishPhase::Uploading => "uploading",
            PublishPhase::AwaitingProcessing => "awaiting_processing",
            PublishPhase::Published => "published",
        };
        f.write_str(s)
    }
}

/// Typed per-destination failure. Serializable so it can live in the post's
/// persisted result map. Never propagates across the engine boundary as a
/// panic or an `AppError`: a failing destination must not abort siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("no {destination} account linked")]
    CredentialMissing { destination: Destination },

    #[error("{destination} token refresh failed: {reason}")]
    CredentialRefreshFailed {
        destination: Destination,
        reason: String,
    },

    #[error("{destination} stage failed: {reason}")]
    StageFailed {
        destination: Destination,
        reason: String,
    },

    #[error("{destination} upload failed: {reason}")]
    UploadFailed {
        destination: Destination,
        reason: String,
    },

    #[error("{destination} processing failed: {reason}")]
    ProcessingFailed {
        destination: Destination,
        reason: String,
    },

    #[error("{destination} still processing after {budget_ms} ms")]
    ProcessingTimeout {
        destination: Destination,
        budget_ms: i64,
    },

    #[error("{destination} publish failed: {reason}")]
    PublishFailed {
        destination: Destination,
        reason: String,
    },

    #[error("{destination} pipeline exceeded its {budget_ms} ms budget")]
    PipelineTimeout {
        destination: Destination,
        budget_ms: i64,
    },

    #[error("{destination} does not support {kind} posts")]
    Unsupported {
        destination: Destination,
        #[serde(rename = "asset_kind")]
        kind: AssetKind,
    },
}

impl DispatchError {
    /// The furthest phase the pipeline reached before this failure.
    pub fn phase_reached(&self) -> PublishPhase {
        match self {
            DispatchError::CredentialMissing { .. }
            | DispatchError::CredentialRefreshFailed { .. }
            | DispatchError::Unsupported { .. }
            | DispatchError::StageFailed { .. } => PublishPhase::Init,
            DispatchError::UploadFailed { .. } => PublishPhase::Staged,
            DispatchError::ProcessingFailed { .. }
            | DispatchError::ProcessingTimeout { .. } => PublishPhase::AwaitingProcessing,
            DispatchError::PublishFailed { .. } => PublishPhase::AwaitingProcessing,
            // Budget exhaustion can interrupt any phase; report uploading as
            // the most common long pole.
            DispatchError::PipelineTimeout { .. } => PublishPhase::Uploading,
        }
    }

    pub fn destination(&self) -> Destination {
        match self {
            DispatchError::CredentialMissing { destination }
            | DispatchError::CredentialRefreshFailed { destination, .. }
            | DispatchError::StageFailed { destination, .. }
            | DispatchError::UploadFailed { destination, .. }
            | DispatchError::ProcessingFailed { destination, .. }
            | DispatchError::ProcessingTimeout { destination, .. }
            | DispatchError::PublishFailed { destination, .. }
            | DispatchError::PipelineTimeout { destination, .. }
            | DispatchError::Unsupported { destination, .. } => *destination,
        }
    }
}

/// Terminal outcome of one destination pipeline, folded into the post's
/// result map. A missing permalink is not a failure: some destinations never
/// hand one back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DestinationOutcome {
    Success {
        native_post_id: String,
        permalink: Option<String>,
    },
    Failure {
        error: DispatchError,
    },
}

impl DestinationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DestinationOutcome::Success { .. })
    }

    pub fn permalink(&self) -> Option<&str> {
        match self {
            DestinationOutcome::Success { permalink, .. } => permalink.as_deref(),
            DestinationOutcome::Failure { .. } => None,
        }
    }
}

/// Per-destination result map. BTreeMap keeps serialization order stable.
pub type DestinationResults = BTreeMap<Destination, DestinationOutcome>;
