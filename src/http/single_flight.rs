use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Flight<T> = Shared<BoxFuture<'static, T>>;

/// Collapses concurrent calls with the same key onto one execution.
///
/// The first caller for a key runs the work; callers arriving while it is
/// pending await the same shared future and receive a clone of its output.
/// The entry is dropped once the leading caller settles (or is cancelled),
/// so later calls start fresh.
pub struct SingleFlight<K, T> {
    flights: Arc<Mutex<HashMap<K, Flight<T>>>>,
}

impl<K, T> Clone for SingleFlight<K, T> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` unless a call for `key` is already pending, in which case
    /// join it. `work` is only invoked by the leading caller.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (flight, _leader) = {
            let mut flights = lock(&self.flights);
            match flights.get(&key) {
                Some(flight) => (flight.clone(), None),
                None => {
                    let flight = work().boxed().shared();
                    flights.insert(key.clone(), flight.clone());
                    let leader = LeaderGuard {
                        flights: Arc::clone(&self.flights),
                        key: Some(key),
                    };
                    (flight, Some(leader))
                }
            }
        };

        flight.await
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.flights).contains_key(key)
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        lock(&self.flights).len()
    }
}

fn lock<K, T>(flights: &Mutex<HashMap<K, Flight<T>>>) -> MutexGuard<'_, HashMap<K, Flight<T>>> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the leader's entry when it settles or its future is dropped.
struct LeaderGuard<K: Hash + Eq, T> {
    flights: Arc<Mutex<HashMap<K, Flight<T>>>>,
    key: Option<K>,
}

impl<K: Hash + Eq, T> Drop for LeaderGuard<K, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.flights).remove(&key);
        }
    }
}
