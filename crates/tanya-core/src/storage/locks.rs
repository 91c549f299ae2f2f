use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// One async mutex per session id, created on first use and dropped again
/// once nobody holds or waits for it.
///
/// Only guards writers inside this process; another process sharing the same
/// directory is not coordinated with.
#[derive(Default)]
pub(crate) struct SessionLocks {
    // never held across an await
    locks: Arc<StdMutex<LockMap>>,
}

/// Exclusive access to one session. Releasing the last handle to a session's
/// mutex removes it from the map.
pub(crate) struct SessionGuard {
    session_id: String,
    locks: Arc<StdMutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    /// Wait for exclusive access to `session_id`.
    pub(crate) async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        SessionGuard {
            session_id: session_id.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release the mutex first so its Arc no longer counts as a holder.
        drop(self.guard.take());
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters cloned the Arc under this same map lock, so a count of one
        // means only the map still refers to it.
        if map
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_id_is_exclusive() {
        let locks = Arc::new(SessionLocks::default());
        let guard = locks.acquire("a").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire("a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should get the lock")
            .unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = SessionLocks::default();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(200), locks.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = SessionLocks::default();
        let a = locks.acquire("a").await;
        let b = locks.acquire("b").await;
        assert_eq!(locks.len(), 2);
        drop(a);
        assert_eq!(locks.len(), 1);
        drop(b);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_someone_waits() {
        let locks = Arc::new(SessionLocks::default());
        let guard = locks.acquire("a").await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire("a").await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        // the waiter now holds it, so the entry must still be there
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
