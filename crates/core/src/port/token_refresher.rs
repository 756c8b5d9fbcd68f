// Token refresher port.

use crate::domain::{Destination, DestinationCredential, TokenGrant};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from a destination's token endpoint.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("refresh rejected: {0}")]
    Rejected(String),

    #[error("no refresh token on record; re-authentication required")]
    RefreshTokenMissing,

    #[error("network error: {0}")]
    Network(String),
}

/// One implementation per destination, performing the destination-specific
/// refresh exchange (refresh_token grant, fb_exchange_token, ...). Only ever
/// invoked by the token lifecycle manager under its per-key lock.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    fn destination(&self) -> Destination;

    async fn refresh(
        &self,
        credential: &DestinationCredential,
    ) -> Result<TokenGrant, RefreshError>;
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counting refresher: hands out sequential tokens, optionally slowly,
    /// so single-flight behavior is observable.
    pub struct CountingRefresher {
        destination: Destination,
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingRefresher {
        pub fn new(destination: Destination) -> Self {
            Self {
                destination,
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                fail: false,
            }
        }

        pub fn failing(destination: Destination) -> Self {
            Self {
                fail: true,
                ..Self::new(destination)
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        fn destination(&self) -> Destination {
            self.destination
        }

        async fn refresh(
            &self,
            _credential: &DestinationCredential,
        ) -> Result<TokenGrant, RefreshError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(RefreshError::Rejected("invalid_grant".into()));
            }
            Ok(TokenGrant {
                access_token: format!("fresh-token-{}", call),
                refresh_token: Some(format!("rotated-refresh-{}", call)),
                expires_in_ms: 24 * 60 * 60 * 1000,
            })
        }
    }
}
