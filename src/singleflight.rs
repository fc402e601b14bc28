//! Call Coalescing (single-flight)
//!
//! Collapses concurrent calls for the same key into one execution.
//!
//! ```text
//!   caller A ──► work("k") ──► leader: runs f() ──┐
//!   caller B ──► work("k") ──► waits ─────────────┼──► same result
//!   caller C ──► work("k") ──► waits ─────────────┘
//! ```
//!
//! The first caller for a key becomes the leader and runs the closure.
//! Callers arriving while it runs subscribe to a `watch` channel and get a
//! clone of the leader's result. The in-flight marker is removed when the
//! leader finishes, so the next call for the key starts a fresh execution.
//! A leader dropped before publishing also removes its marker; its waiters
//! then race to lead a new execution.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Coalesces concurrent executions per key.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

/// Removes the in-flight marker when the leader completes or is dropped.
struct LeaderGuard<'a, T> {
    calls: &'a Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
    key: &'a str,
}

impl<T> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        self.calls.lock().remove(self.key);
    }
}

enum Role<T> {
    Leader(watch::Sender<Option<T>>),
    Waiter(watch::Receiver<Option<T>>),
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` for `key` unless a run is already in flight, in which case
    /// wait for it and return a clone of its result.
    pub async fn work<F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let tx = loop {
            match self.join(key) {
                Role::Leader(tx) => break tx,
                Role::Waiter(mut rx) => {
                    if let Some(value) = Self::wait(&mut rx).await {
                        return value;
                    }
                    tracing::debug!(key, "in-flight leader dropped, retrying");
                }
            }
        };

        // dropped before `tx`, so waiters never re-join a dead marker
        let _guard = LeaderGuard {
            calls: &self.calls,
            key,
        };
        let value = f().await;
        tx.send_replace(Some(value.clone()));
        value
    }

    /// Number of keys with an execution in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn join(&self, key: &str) -> Role<T> {
        let mut calls = self.calls.lock();
        if let Some(rx) = calls.get(key) {
            return Role::Waiter(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        calls.insert(key.to_string(), rx);
        Role::Leader(tx)
    }

    /// Wait for the leader's result; `None` if the leader went away first.
    async fn wait(rx: &mut watch::Receiver<Option<T>>) -> Option<T> {
        loop {
            if let Some(value) = rx.borrow_and_update().as_ref() {
                return Some(value.clone());
            }
            if rx.changed().await.is_err() {
                return rx.borrow().as_ref().cloned();
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_call_returns_value() {
        let group: SingleFlight<Result<String, String>> = SingleFlight::new();
        let value = group.work("key", || async { Ok("bar".to_string()) }).await;
        assert_eq!(value, Ok("bar".to_string()));
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_error_is_shared_like_a_value() {
        let group: SingleFlight<Result<String, String>> = SingleFlight::new();
        let value = group.work("key", || async { Err("boom".to_string()) }).await;
        assert_eq!(value, Err("boom".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_are_coalesced() {
        let group = Arc::new(SingleFlight::<usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let group = Arc::clone(&group);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    group
                        .work("key", || async move {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            calls.fetch_add(1, Ordering::SeqCst) + 42
                        })
                        .await
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        for result in results {
            assert_eq!(result.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_completed_call_is_not_reused() {
        let group: SingleFlight<usize> = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        for expected in 1..=3 {
            let got = group
                .work("key", || async { calls.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(got, expected);
        }
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let group: SingleFlight<String> = SingleFlight::new();
        let (a, b) = tokio::join!(
            group.work("a", || async { "A".to_string() }),
            group.work("b", || async { "B".to_string() }),
        );
        assert_eq!((a.as_str(), b.as_str()), ("A", "B"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_leader_hands_over() {
        let group = Arc::new(SingleFlight::<&'static str>::new());

        let leader = {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .work("key", || async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        "never"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(group.in_flight(), 1);

        let waiter = {
            let group = Arc::clone(&group);
            tokio::spawn(async move { group.work("key", || async { "retried" }).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        leader.abort();
        let value = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should not hang")
            .unwrap();
        assert_eq!(value, "retried");
        assert_eq!(group.in_flight(), 0);
    }
}
