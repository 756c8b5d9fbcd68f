// Shared HTTP plumbing for the destination adapters.

use serde_json::Value;
use std::future::Future;
use unipost_core::domain::{Destination, DispatchError};

/// Consecutive failed status reads tolerated before readiness polling gives
/// up on a destination.
pub(crate) const TRANSIENT_READ_LIMIT: u32 = 3;

/// Per-chunk retry budget during byte transfer.
pub(crate) const CHUNK_RETRY_LIMIT: u32 = 3;

/// Decode a JSON response, folding non-2xx statuses and body-decode failures
/// into one reason string for the caller's `DispatchError`.
pub(crate) async fn json_of(response: reqwest::Response) -> Result<Value, String> {
    let status = response.status();
    let text = response.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        return Err(format!("{}: {}", status, truncate(&text, 300)));
    }
    serde_json::from_str(&text).map_err(|e| format!("invalid json body: {}", e))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &s[..cut])
    }
}

/// One read of a destination's ingest status.
pub(crate) enum Readiness {
    Ready,
    Pending,
    Failed(String),
}

/// Poll `read` at the destination's interval until ready, failed, or the
/// readiness budget runs out. Up to [`TRANSIENT_READ_LIMIT`] consecutive read
/// errors are tolerated as transient.
pub(crate) async fn poll_readiness<F, Fut>(
    destination: Destination,
    mut read: F,
) -> Result<(), DispatchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Readiness, String>>,
{
    let budget = destination.readiness_budget();
    let deadline = tokio::time::Instant::now() + budget;
    let mut consecutive_errors = 0u32;

    loop {
        match read().await {
            Ok(Readiness::Ready) => return Ok(()),
            Ok(Readiness::Failed(reason)) => {
                return Err(DispatchError::ProcessingFailed {
                    destination,
                    reason,
                })
            }
            Ok(Readiness::Pending) => consecutive_errors = 0,
            Err(reason) => {
                consecutive_errors += 1;
                if consecutive_errors >= TRANSIENT_READ_LIMIT {
                    return Err(DispatchError::ProcessingFailed {
                        destination,
                        reason: format!("status check failed repeatedly: {}", reason),
                    });
                }
            }
        }

        if tokio::time::Instant::now() + destination.poll_interval() > deadline {
            return Err(DispatchError::ProcessingTimeout {
                destination,
                budget_ms: budget.as_millis() as i64,
            });
        }
        tokio::time::sleep(destination.poll_interval()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 300), "short");
        let cut = truncate("aaaaéé", 5);
        assert!(cut.ends_with("..."));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_then_ready_succeeds() {
        let reads = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&reads);
        poll_readiness(unipost_core::domain::Destination::Facebook, move || {
            let r = Arc::clone(&r);
            async move {
                if r.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(Readiness::Pending)
                } else {
                    Ok(Readiness::Ready)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_tolerated_up_to_the_limit() {
        let reads = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&reads);
        poll_readiness(unipost_core::domain::Destination::Facebook, move || {
            let r = Arc::clone(&r);
            async move {
                if r.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("503".to_string())
                } else {
                    Ok(Readiness::Ready)
                }
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_errors_become_fatal() {
        let err = poll_readiness(unipost_core::domain::Destination::Facebook, || async {
            Err::<Readiness, _>("503".to_string())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::ProcessingFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_times_out() {
        let err = poll_readiness(unipost_core::domain::Destination::Facebook, || async {
            Ok(Readiness::Pending)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DispatchError::ProcessingTimeout { .. }));
    }
}
