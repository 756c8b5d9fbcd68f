// Credential store port.

use crate::domain::{Destination, DestinationCredential, OwnerId};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence for per-(owner, destination) credential records. Mutated only
/// by the token lifecycle manager (refresh) and the account link/unlink flow.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(
        &self,
        owner: &OwnerId,
        destination: Destination,
    ) -> Result<Option<DestinationCredential>>;

    /// Insert or replace, keyed on (owner, destination).
    async fn upsert(&self, credential: &DestinationCredential) -> Result<()>;

    /// Unlink an account. Returns false when nothing was stored.
    async fn delete(&self, owner: &OwnerId, destination: Destination) -> Result<bool>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryCredentialStore {
        records: Mutex<HashMap<(OwnerId, Destination), DestinationCredential>>,
    }

    impl MemoryCredentialStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(credential: DestinationCredential) -> Self {
            let store = Self::default();
            store.records.lock().unwrap().insert(
                (credential.owner.clone(), credential.destination),
                credential,
            );
            store
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryCredentialStore {
        async fn get(
            &self,
            owner: &OwnerId,
            destination: Destination,
        ) -> Result<Option<DestinationCredential>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(owner.clone(), destination))
                .cloned())
        }

        async fn upsert(&self, credential: &DestinationCredential) -> Result<()> {
            self.records.lock().unwrap().insert(
                (credential.owner.clone(), credential.destination),
                credential.clone(),
            );
            Ok(())
        }

        async fn delete(&self, owner: &OwnerId, destination: Destination) -> Result<bool> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .remove(&(owner.clone(), destination))
                .is_some())
        }
    }
}
