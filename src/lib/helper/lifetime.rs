use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::*;

/// "Still active" token shared between a component and the tasks it spawns.
///
/// Producers hold [`Lifetime::guard`] for the whole mutation. [`Lifetime::end`]
/// takes the lock exclusively, so once it returns no mutation is running and
/// none can start.
#[derive(Debug, Clone)]
pub struct Lifetime {
    active: Arc<RwLock<bool>>,
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifetime {
    pub fn new() -> Self {
        Self {
            active: Arc::new(RwLock::new(true)),
        }
    }

    /// Returns a guard while the owner is alive, `None` after [`Lifetime::end`].
    pub async fn guard(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let guard = self.active.read().await;
        if *guard {
            Some(guard)
        } else {
            None
        }
    }

    pub async fn is_active(&self) -> bool {
        *self.active.read().await
    }

    /// Marks the owner as gone, waiting for any in-progress mutation. Idempotent.
    #[instrument(level = "trace", skip(self))]
    pub async fn end(&self) {
        let mut active = self.active.write().await;
        *active = false;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn guard_is_refused_after_end() {
        let lifetime = Lifetime::new();
        assert!(lifetime.guard().await.is_some());

        lifetime.end().await;
        lifetime.end().await;

        assert!(lifetime.guard().await.is_none());
        assert!(!lifetime.is_active().await);
    }

    #[tokio::test(start_paused = true)]
    async fn end_waits_for_running_mutation() {
        let lifetime = Lifetime::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let producer = tokio::spawn({
            let lifetime = lifetime.clone();
            let log = log.clone();
            async move {
                let _alive = lifetime.guard().await.unwrap();
                tokio::time::sleep(Duration::from_secs(1)).await;
                log.lock().unwrap().push("mutated");
            }
        });

        tokio::task::yield_now().await;
        lifetime.end().await;
        log.lock().unwrap().push("ended");
        producer.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["mutated", "ended"]);
    }
}
