use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// One async mutex per dam.
///
/// Every input write and every recompute for a dam holds its guard, so a
/// derivation always reads one consistent set of snapshots and concurrent
/// writers to the same dam are applied one after another.
#[derive(Clone, Default)]
pub struct DamLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl DamLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callers must check that the dam exists first; the map only keeps
    /// entries that are held or awaited.
    pub async fn lock(&self, dam_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Only the map holds an idle entry's Arc.
            locks.retain(|id, lock| *id == dam_id || Arc::strong_count(lock) > 1);
            locks.entry(dam_id).or_default().clone()
        };
        trace!(dam_id, "Waiting for dam lock");
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_dam_is_serialized() {
        let locks = DamLocks::new();
        let guard = locks.lock(1).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_entries_are_dropped() {
        let locks = DamLocks::new();
        for dam_id in 0..100 {
            let _guard = locks.lock(dam_id).await;
        }
        let held = locks.lock(500).await;
        assert_eq!(locks.tracked().await, 1);

        // A held entry survives other dams locking.
        drop(locks.lock(501).await);
        assert_eq!(locks.tracked().await, 2);
        drop(held);
        drop(locks.lock(502).await);
        assert_eq!(locks.tracked().await, 1);
    }

    #[tokio::test]
    async fn test_different_dams_do_not_block() {
        let locks = DamLocks::new();
        let _first = locks.lock(1).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(2)).await;
        assert!(second.is_ok());
    }
}
