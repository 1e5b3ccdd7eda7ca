//! Per-variant critical sections for the change detector.
//!
//! Two snapshots of the same variant analysed concurrently would both read
//! the old state and append divergent history rows. [`VariantLocks`] hands
//! out one async mutex per variant so the read-diff-append sequence of a
//! variant is serialized while different variants proceed in parallel.
//!
//! Entries only live while a guard is held or awaited; the last guard to
//! drop removes its variant from the map.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::VariantId;

/// Registry of per-variant mutexes.
///
/// The outer map sits behind a synchronous mutex that is never held across
/// an `.await`, so a [`VariantGuard`] can prune its entry from `Drop`.
#[derive(Debug, Default)]
pub struct VariantLocks {
    locks: StdMutex<HashMap<VariantId, Arc<Mutex<()>>>>,
}

impl VariantLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<VariantId, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for exclusive access to `variant_id`.
    ///
    /// The critical section lasts as long as the returned guard.
    pub async fn acquire(&self, variant_id: VariantId) -> VariantGuard<'_> {
        let lock = Arc::clone(self.map().entry(variant_id).or_default());
        let guard = lock.lock_owned().await;
        VariantGuard {
            locks: self,
            variant_id,
            guard: Some(guard),
        }
    }

    /// Returns the number of variants currently locked or awaited.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Returns `true` if no variant is locked or awaited.
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// Exclusive access to one variant, released on drop.
pub struct VariantGuard<'a> {
    locks: &'a VariantLocks,
    variant_id: VariantId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl fmt::Debug for VariantGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantGuard")
            .field("variant_id", &self.variant_id)
            .finish_non_exhaustive()
    }
}

impl Drop for VariantGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.map();
        // The owned guard holds a reference to the mutex; release it first so
        // a count of one means only the map still knows the variant.
        drop(self.guard.take());
        if map
            .get(&self.variant_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.variant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_variant_is_serialized() {
        let locks = Arc::new(VariantLocks::new());
        let guard = locks.acquire(VariantId::new(1)).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(VariantId::new(1)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        assert_eq!(locks.len(), 1);

        drop(guard);
        let joined = tokio::time::timeout(Duration::from_secs(1), contender).await;
        assert!(joined.is_ok());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_variants_do_not_block() {
        let locks = VariantLocks::new();
        let _a = locks.acquire(VariantId::new(1)).await;
        let b =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire(VariantId::new(2))).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn released_variants_are_forgotten() {
        let locks = VariantLocks::new();
        for id in 0..1000 {
            let guard = locks.acquire(VariantId::new(id)).await;
            drop(guard);
        }
        assert!(locks.is_empty());

        let held = locks.acquire(VariantId::new(7)).await;
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.len(), 0);
    }
}
