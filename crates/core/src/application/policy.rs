use crate::domain::{PolicyProfile, Post, Tier};
use crate::port::SubscriptionStore;
use crate::{AppError, Result};
use std::sync::Arc;
use tracing::debug;

/// Resolves an owner's subscription tier and validates a post against the
/// tier's limits before any destination work begins.
pub struct PolicyGate {
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl PolicyGate {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self { subscriptions }
    }

    /// Validate the post up front and return the profile the pipeline must
    /// honor (watermarking, caption branding). Owners without a subscription
    /// row are treated as free tier.
    pub async fn authorize(&self, post: &Post) -> Result<PolicyProfile> {
        let tier = self
            .subscriptions
            .tier(&post.owner)
            .await?
            .unwrap_or(Tier::Free);
        let profile = PolicyProfile::for_tier(tier);

        debug!(post_id = %post.id, owner = %post.owner, tier = %tier, "resolved policy tier");

        if post.destinations.is_empty() {
            return Err(AppError::Validation(
                "post has no destinations".to_string(),
            ));
        }
        if post.destinations.len() > profile.max_destinations {
            return Err(AppError::PolicyViolation(format!(
                "tier {} allows at most {} destinations, got {}",
                tier,
                profile.max_destinations,
                post.destinations.len()
            )));
        }
        if post.scheduled_at.is_some() && !profile.allow_schedule {
            return Err(AppError::PolicyViolation(format!(
                "tier {} does not allow scheduled publishing",
                tier
            )));
        }

        Ok(profile)
    }
}

/// Apply the tier's caption branding. The suffix is appended once; captions
/// already carrying it are left untouched so retries stay idempotent.
pub fn branded_caption(caption: &str, profile: &PolicyProfile) -> String {
    const SUFFIX: &str = "\n\nvia UniPost";
    if !profile.branded_caption || caption.ends_with(SUFFIX) {
        return caption.to_string();
    }
    format!("{}{}", caption, SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, Destination, Post};
    use crate::port::subscription_store::mocks::MemorySubscriptionStore;

    fn post_with(destinations: Vec<Destination>, scheduled_at: Option<i64>) -> Post {
        Post::new(
            "post-1",
            1_000,
            "owner-1",
            Asset::Video {
                path: "media/owner-1/a.mp4".into(),
            },
            "hello",
            "",
            destinations,
            scheduled_at,
        )
    }

    #[tokio::test]
    async fn unknown_owner_defaults_to_free() {
        let gate = PolicyGate::new(Arc::new(MemorySubscriptionStore::new()));
        let profile = gate
            .authorize(&post_with(vec![Destination::Youtube], None))
            .await
            .unwrap();
        assert!(profile.require_watermark);
        assert!(!profile.allow_schedule);
    }

    #[tokio::test]
    async fn free_tier_rejects_scheduling() {
        let gate = PolicyGate::new(Arc::new(MemorySubscriptionStore::new()));
        let err = gate
            .authorize(&post_with(vec![Destination::Youtube], Some(9_999)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(_)));
    }

    #[tokio::test]
    async fn destination_count_is_capped() {
        let store = MemorySubscriptionStore::with("owner-1", Tier::Free);
        let gate = PolicyGate::new(Arc::new(store));
        let err = gate
            .authorize(&post_with(Destination::ALL.to_vec(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(_)));
    }

    #[tokio::test]
    async fn pro_tier_allows_scheduling_and_all_destinations() {
        let store = MemorySubscriptionStore::with("owner-1", Tier::Pro);
        let gate = PolicyGate::new(Arc::new(store));
        let profile = gate
            .authorize(&post_with(Destination::ALL.to_vec(), Some(9_999)))
            .await
            .unwrap();
        assert!(!profile.require_watermark);
    }

    #[tokio::test]
    async fn empty_destinations_fail_validation() {
        let gate = PolicyGate::new(Arc::new(MemorySubscriptionStore::new()));
        let err = gate.authorize(&post_with(vec![], None)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn branding_is_idempotent() {
        let profile = PolicyProfile::for_tier(Tier::Free);
        let once = branded_caption("my clip", &profile);
        assert_eq!(once, "my clip\n\nvia UniPost");
        assert_eq!(branded_caption(&once, &profile), once);
    }

    #[test]
    fn elite_caption_is_untouched() {
        let profile = PolicyProfile::for_tier(Tier::Elite);
        assert_eq!(branded_caption("my clip", &profile), "my clip");
    }
}
