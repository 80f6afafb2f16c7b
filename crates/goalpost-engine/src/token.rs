//! Cooperative cancellation for running executors.
//!
//! The engine never interrupts an executor. When a running goal is
//! canceled its token flips, and the executor is expected to notice on its
//! own (poll [`CancellationToken::is_cancelled`] or await
//! [`CancellationToken::cancelled`]) and stop.

use std::collections::HashMap;

use goalpost_core::GoalKey;
use tokio::sync::{watch, RwLock};

/// Cancellation signal handed to an executor.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the goal is cancelled; pending forever otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

struct Registered {
    sender: watch::Sender<bool>,
    /// Runners holding a token for the key.
    holders: usize,
}

/// Tokens for the goals currently being executed.
#[derive(Default)]
pub struct CancellationRegistry {
    senders: RwLock<HashMap<GoalKey, Registered>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for `key`, shared with any other runner of the same goal.
    pub async fn register(&self, key: &GoalKey) -> CancellationToken {
        let mut senders = self.senders.write().await;
        let registered = senders.entry(key.clone()).or_insert_with(|| Registered {
            sender: watch::channel(false).0,
            holders: 0,
        });
        registered.holders += 1;
        CancellationToken {
            rx: registered.sender.subscribe(),
        }
    }

    /// Cancel the token of `key`. Returns false if nothing is running it.
    pub async fn signal(&self, key: &GoalKey) -> bool {
        let senders = self.senders.read().await;
        match senders.get(key) {
            Some(registered) => {
                registered.sender.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Drop one runner's hold on the token of `key`, forgetting the token
    /// once no runner holds it.
    pub async fn release(&self, key: &GoalKey) {
        let mut senders = self.senders.write().await;
        if let Some(registered) = senders.get_mut(key) {
            registered.holders = registered.holders.saturating_sub(1);
            if registered.holders == 0 {
                senders.remove(key);
            }
        }
    }

    /// Number of goals with a registered token.
    pub async fn len(&self) -> usize {
        self.senders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.senders.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goalpost_core::GoalSetId;
    use std::time::Duration;

    fn key() -> GoalKey {
        GoalKey::new(GoalSetId::from("gs-1"), "build")
    }

    #[tokio::test]
    async fn test_signal_flips_token() {
        let registry = CancellationRegistry::new();
        let token = registry.register(&key()).await;
        assert!(!token.is_cancelled());

        assert!(registry.signal(&key()).await);
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("token should resolve");
    }

    #[tokio::test]
    async fn test_signal_without_runner() {
        let registry = CancellationRegistry::new();
        assert!(!registry.signal(&key()).await);
    }

    #[tokio::test]
    async fn test_waiting_executor_wakes_up() {
        let registry = std::sync::Arc::new(CancellationRegistry::new());
        let token = registry.register(&key()).await;

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            true
        });
        tokio::task::yield_now().await;
        registry.signal(&key()).await;

        let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(woke);
    }

    #[tokio::test]
    async fn test_release_forgets_token() {
        let registry = CancellationRegistry::new();
        registry.register(&key()).await;
        assert_eq!(registry.len().await, 1);
        registry.release(&key()).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_shared_token_survives_first_release() {
        let registry = CancellationRegistry::new();
        let first = registry.register(&key()).await;
        let second = registry.register(&key()).await;

        registry.release(&key()).await;
        assert_eq!(registry.len().await, 1);
        assert!(registry.signal(&key()).await);
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());

        registry.release(&key()).await;
        assert!(registry.is_empty().await);
        registry.release(&key()).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_never_token_stays_pending() {
        let token = CancellationToken::never();
        assert!(!token.is_cancelled());
        let result = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(result.is_err());
    }
}
