// Token lifecycle manager: hands out currently-valid credentials, refreshing
// proactively inside each destination's safety margin.

use crate::domain::{
    Destination, DestinationAuth, DestinationCredential, DispatchError, OwnerId,
};
use crate::port::{CredentialStore, TimeProvider, TokenRefresher};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type RefreshKey = (OwnerId, Destination);

/// Returns a valid (token, native account id) pair for an (owner,
/// destination), refreshing and persisting when the stored credential is
/// inside its safety margin.
///
/// Refresh is single-flighted per key: destinations like TikTok invalidate
/// the previous refresh token on rotation, so two racing refreshes would
/// corrupt the stored credential. Losers of the race wait on the per-key
/// lock, re-read the store, and use the winner's grant.
pub struct TokenLifecycleManager {
    credentials: Arc<dyn CredentialStore>,
    refreshers: HashMap<Destination, Arc<dyn TokenRefresher>>,
    time: Arc<dyn TimeProvider>,
    // Keyed lock table; entries live for the process lifetime.
    refresh_locks: Mutex<HashMap<RefreshKey, Arc<Mutex<()>>>>,
}

impl TokenLifecycleManager {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        refreshers: HashMap<Destination, Arc<dyn TokenRefresher>>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            credentials,
            refreshers,
            time,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a currently-valid credential, refreshing if needed. Fails with
    /// `CredentialMissing` when the account was never linked and
    /// `CredentialRefreshFailed` when the refresh exchange fails; a stale
    /// token is never returned silently.
    pub async fn get_valid_credential(
        &self,
        owner: &OwnerId,
        destination: Destination,
    ) -> Result<DestinationAuth, DispatchError> {
        let credential = self.load(owner, destination).await?;

        if !credential.needs_refresh(self.time.now_millis()) {
            return Ok(auth_of(&credential));
        }

        let key_lock = self.lock_for(owner, destination).await;
        let _guard = key_lock.lock().await;

        // Re-read under the lock: if we lost the race, the winner already
        // persisted a fresh grant and no second refresh happens.
        let credential = self.load(owner, destination).await?;
        if !credential.needs_refresh(self.time.now_millis()) {
            debug!(
                owner = %owner,
                destination = %destination,
                "credential already refreshed by concurrent caller"
            );
            return Ok(auth_of(&credential));
        }

        self.refresh_and_store(credential).await.map(|c| auth_of(&c))
    }

    async fn refresh_and_store(
        &self,
        credential: DestinationCredential,
    ) -> Result<DestinationCredential, DispatchError> {
        let destination = credential.destination;
        let refresher = self.refreshers.get(&destination).ok_or_else(|| {
            DispatchError::CredentialRefreshFailed {
                destination,
                reason: "no refresher registered".into(),
            }
        })?;

        info!(
            owner = %credential.owner,
            destination = %destination,
            expires_at = credential.expires_at,
            "refreshing destination credential"
        );

        let grant = refresher.refresh(&credential).await.map_err(|e| {
            warn!(
                owner = %credential.owner,
                destination = %destination,
                error = %e,
                "credential refresh failed"
            );
            DispatchError::CredentialRefreshFailed {
                destination,
                reason: e.to_string(),
            }
        })?;

        let now = self.time.now_millis();
        let updated = DestinationCredential {
            access_token: grant.access_token,
            // Keep the old refresh token unless the destination rotated it.
            refresh_token: grant.refresh_token.or(credential.refresh_token),
            expires_at: now + grant.expires_in_ms,
            updated_at: now,
            ..credential
        };

        self.credentials.upsert(&updated).await.map_err(|e| {
            DispatchError::CredentialRefreshFailed {
                destination,
                reason: format!("persisting refreshed credential: {}", e),
            }
        })?;

        Ok(updated)
    }

    async fn load(
        &self,
        owner: &OwnerId,
        destination: Destination,
    ) -> Result<DestinationCredential, DispatchError> {
        self.credentials
            .get(owner, destination)
            .await
            .map_err(|e| DispatchError::CredentialRefreshFailed {
                destination,
                reason: format!("credential lookup: {}", e),
            })?
            .ok_or(DispatchError::CredentialMissing { destination })
    }

    async fn lock_for(&self, owner: &OwnerId, destination: Destination) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        Arc::clone(
            locks
                .entry((owner.clone(), destination))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

fn auth_of(credential: &DestinationCredential) -> DestinationAuth {
    DestinationAuth {
        access_token: credential.access_token.clone(),
        account_id: credential.account_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::credential_store::mocks::MemoryCredentialStore;
    use crate::port::providers::mocks::FixedClock;
    use crate::port::token_refresher::mocks::CountingRefresher;

    const NOW: i64 = 1_700_000_000_000;

    fn cred(expires_at: i64) -> DestinationCredential {
        DestinationCredential {
            owner: "owner-1".into(),
            destination: Destination::Tiktok,
            access_token: "old-token".into(),
            refresh_token: Some("old-refresh".into()),
            expires_at,
            account_id: "acct-9".into(),
            updated_at: 0,
        }
    }

    fn manager(
        store: Arc<MemoryCredentialStore>,
        refresher: Arc<CountingRefresher>,
    ) -> TokenLifecycleManager {
        let mut refreshers: HashMap<Destination, Arc<dyn TokenRefresher>> = HashMap::new();
        refreshers.insert(Destination::Tiktok, refresher);
        TokenLifecycleManager::new(store, refreshers, Arc::new(FixedClock::at(NOW)))
    }

    #[tokio::test]
    async fn missing_credential_is_reported() {
        let mgr = manager(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(CountingRefresher::new(Destination::Tiktok)),
        );
        let err = mgr
            .get_valid_credential(&"owner-1".to_string(), Destination::Tiktok)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::CredentialMissing { .. }));
    }

    #[tokio::test]
    async fn fresh_credential_skips_refresh() {
        let margin = Destination::Tiktok.refresh_margin_ms();
        let store = Arc::new(MemoryCredentialStore::with(cred(NOW + margin + 1000)));
        let refresher = Arc::new(CountingRefresher::new(Destination::Tiktok));
        let mgr = manager(store, Arc::clone(&refresher));

        let auth = mgr
            .get_valid_credential(&"owner-1".to_string(), Destination::Tiktok)
            .await
            .unwrap();
        assert_eq!(auth.access_token, "old-token");
        assert_eq!(auth.account_id, "acct-9");
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn expiring_credential_is_refreshed_and_persisted() {
        let store = Arc::new(MemoryCredentialStore::with(cred(NOW + 1000)));
        let refresher = Arc::new(CountingRefresher::new(Destination::Tiktok));
        let mgr = manager(Arc::clone(&store), Arc::clone(&refresher));

        let auth = mgr
            .get_valid_credential(&"owner-1".to_string(), Destination::Tiktok)
            .await
            .unwrap();
        assert_eq!(auth.access_token, "fresh-token-1");
        assert_eq!(refresher.calls(), 1);

        let stored = store
            .get(&"owner-1".to_string(), Destination::Tiktok)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "fresh-token-1");
        assert_eq!(stored.refresh_token.as_deref(), Some("rotated-refresh-1"));
        assert!(stored.expires_at > NOW);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let store = Arc::new(MemoryCredentialStore::with(cred(NOW + 1000)));
        let refresher = Arc::new(CountingRefresher::new(Destination::Tiktok));
        let mgr = Arc::new(manager(Arc::clone(&store), Arc::clone(&refresher)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            handles.push(tokio::spawn(async move {
                mgr.get_valid_credential(&"owner-1".to_string(), Destination::Tiktok)
                    .await
            }));
        }

        for handle in handles {
            let auth = handle.await.unwrap().unwrap();
            assert_eq!(auth.access_token, "fresh-token-1");
        }
        assert_eq!(refresher.calls(), 1, "refresh must be single-flighted");
    }

    #[tokio::test]
    async fn failed_refresh_never_returns_stale_token() {
        let store = Arc::new(MemoryCredentialStore::with(cred(NOW + 1000)));
        let refresher = Arc::new(CountingRefresher::failing(Destination::Tiktok));
        let mgr = manager(store, refresher);

        let err = mgr
            .get_valid_credential(&"owner-1".to_string(), Destination::Tiktok)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::CredentialRefreshFailed { .. }
        ));
    }
}
