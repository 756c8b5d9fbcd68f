// Graceful shutdown signalling for the scheduler and dispatch worker.

use tokio::sync::watch;

/// Receiver half handed to long-running loops.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is signalled (or the sender is dropped).
    pub async fn wait(&mut self) {
        let _ = self.rx.changed().await;
    }
}

/// Sender half kept by the composition root.
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_reaches_all_clones() {
        let (tx, token) = shutdown_channel();
        let mut a = token.clone();
        let mut b = token;

        assert!(!a.is_shutdown());
        tx.shutdown();
        a.wait().await;
        b.wait().await;
        assert!(a.is_shutdown());
        assert!(b.is_shutdown());
    }
}
