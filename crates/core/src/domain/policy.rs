// Subscription tiers and the policy profile derived from them.

use serde::{Deserialize, Serialize};

/// Subscription tier. Unknown rows in the store fall back to Free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    Elite,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Elite => "elite",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Some(Tier::Free),
            "pro" => Some(Tier::Pro),
            "elite" => Some(Tier::Elite),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entitlements applied to one dispatch. Resolved fresh from the owner's
/// current tier every time a job runs, never cached across a job's lifetime,
/// so a downgrade mid-schedule takes effect on the next dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyProfile {
    pub max_destinations: usize,
    pub allow_schedule: bool,
    pub require_watermark: bool,
    pub branded_caption: bool,
}

impl PolicyProfile {
    /// Source of truth for tier capabilities.
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => PolicyProfile {
                max_destinations: 3,
                allow_schedule: false,
                require_watermark: true,
                branded_caption: true,
            },
            Tier::Pro => PolicyProfile {
                max_destinations: 5,
                allow_schedule: true,
                require_watermark: false,
                branded_caption: true,
            },
            // "Unlimited" in practice: more slots than destinations exist.
            Tier::Elite => PolicyProfile {
                max_destinations: 20,
                allow_schedule: true,
                require_watermark: false,
                branded_caption: false,
            },
        }
    }
}
