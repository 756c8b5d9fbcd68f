// Subscription store port.

use crate::domain::{OwnerId, Tier};
use crate::error::Result;
use async_trait::async_trait;

/// Read access to the owner's current subscription tier. `None` means no
/// subscription row exists; callers treat that as Free.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn tier(&self, owner: &OwnerId) -> Result<Option<Tier>>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemorySubscriptionStore {
        tiers: Mutex<HashMap<OwnerId, Tier>>,
    }

    impl MemorySubscriptionStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(owner: impl Into<OwnerId>, tier: Tier) -> Self {
            let store = Self::default();
            store.tiers.lock().unwrap().insert(owner.into(), tier);
            store
        }

        pub fn set(&self, owner: impl Into<OwnerId>, tier: Tier) {
            self.tiers.lock().unwrap().insert(owner.into(), tier);
        }
    }

    #[async_trait]
    impl SubscriptionStore for MemorySubscriptionStore {
        async fn tier(&self, owner: &OwnerId) -> Result<Option<Tier>> {
            Ok(self.tiers.lock().unwrap().get(owner).copied())
        }
    }
}
