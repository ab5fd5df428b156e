use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type Slot<V> = watch::Receiver<Option<V>>;

/// Collapses concurrent calls for the same key into one execution.
///
/// The first caller (leader) runs the work; everyone arriving while it is in
/// flight waits on the leader's `watch` channel and receives a clone of its
/// result. If the leader is dropped before finishing, followers get `None`.
#[derive(Debug)]
pub struct SingleFlight<K, V> {
    inflight: Arc<Mutex<HashMap<K, Slot<V>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Removes the leader's slot however the leader exits.
struct LeaderGuard<K: Eq + Hash, V> {
    inflight: Arc<Mutex<HashMap<K, Slot<V>>>>,
    key: Option<K>,
}

impl<K: Eq + Hash, V> Drop for LeaderGuard<K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.inflight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
        }
    }
}

enum Role<V> {
    Leader(watch::Sender<Option<V>>),
    Follower(Slot<V>),
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Runs `work` unless an execution for `key` is already in flight.
    ///
    /// Returns `None` only to followers whose leader was dropped.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let role = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            match inflight.get(&key) {
                Some(slot) => Role::Follower(slot.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.clone(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Follower(mut slot) => {
                let outcome = slot.wait_for(Option::is_some).await.ok()?;
                outcome.clone()
            }
            Role::Leader(tx) => {
                let _guard = LeaderGuard {
                    inflight: Arc::clone(&self.inflight),
                    key: Some(key),
                };
                let value = work().await;
                // Followers hold receivers; a send with none left is fine.
                let _ = tx.send(Some(value.clone()));
                Some(value)
            }
        }
    }
}
