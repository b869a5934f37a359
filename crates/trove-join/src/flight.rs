use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::mem;
use std::sync::Mutex;

use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// SingleFlight
// ---------------------------------------------------------------------------

enum FlightState<T> {
    Idle,
    Running(Vec<oneshot::Sender<T>>),
    Done(T),
}

/// Gate around one unit of asynchronous work.
///
/// The first caller runs the work. Callers arriving while it runs are queued
/// and receive the result in arrival order. Callers arriving afterwards get
/// the cached result immediately. If the running caller is dropped before
/// finishing, the gate returns to idle and the next queued caller takes over.
pub struct SingleFlight<T> {
    state: Mutex<FlightState<T>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Idle),
        }
    }

    pub async fn run<F, Fut>(&self, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let rx = {
                let mut state = self.state.lock().expect("flight lock poisoned");
                match &mut *state {
                    FlightState::Done(value) => return value.clone(),
                    FlightState::Running(waiters) => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        rx
                    }
                    FlightState::Idle => {
                        *state = FlightState::Running(Vec::new());
                        break;
                    }
                }
            };
            if let Ok(value) = rx.await {
                return value;
            }
        }

        let mut guard = LeaderGuard {
            state: &self.state,
            finished: false,
        };
        let value = work().await;
        guard.finished = true;

        let previous = {
            let mut state = self.state.lock().expect("flight lock poisoned");
            mem::replace(&mut *state, FlightState::Done(value.clone()))
        };
        if let FlightState::Running(waiters) = previous {
            for tx in waiters {
                let _ = tx.send(value.clone());
            }
        }
        value
    }

    /// The cached result, if the work has finished.
    pub fn peek(&self) -> Option<T> {
        match &*self.state.lock().expect("flight lock poisoned") {
            FlightState::Done(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            &*self.state.lock().expect("flight lock poisoned"),
            FlightState::Running(_)
        )
    }

    /// Forget a cached result so the next caller runs the work again.
    /// Has no effect while the work is running.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("flight lock poisoned");
        if matches!(&*state, FlightState::Done(_)) {
            *state = FlightState::Idle;
        }
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct LeaderGuard<'a, T> {
    state: &'a Mutex<FlightState<T>>,
    finished: bool,
}

impl<T> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.state.lock().expect("flight lock poisoned");
        if matches!(&*state, FlightState::Running(_)) {
            // Dropping the queued senders wakes the waiters, which retry.
            *state = FlightState::Idle;
        }
    }
}

// ---------------------------------------------------------------------------
// FlightGroup
// ---------------------------------------------------------------------------

/// Keyed single-flight for in-flight work only.
///
/// Concurrent calls with the same key share one execution. Once the leader
/// finishes the key is forgotten, so failures are never cached here.
pub struct FlightGroup<K, V> {
    calls: Mutex<HashMap<K, Vec<oneshot::Sender<V>>>>,
}

impl<K, V> FlightGroup<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        loop {
            let rx = {
                let mut calls = self.calls.lock().expect("flight lock poisoned");
                match calls.get_mut(&key) {
                    Some(waiters) => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        rx
                    }
                    None => {
                        calls.insert(key.clone(), Vec::new());
                        break;
                    }
                }
            };
            if let Ok(value) = rx.await {
                return value;
            }
        }

        let mut guard = GroupGuard {
            calls: &self.calls,
            key: &key,
            finished: false,
        };
        let value = work().await;
        guard.finished = true;

        let waiters = self
            .calls
            .lock()
            .expect("flight lock poisoned")
            .remove(&key)
            .unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(value.clone());
        }
        value
    }

    /// Number of keys with work currently running.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().expect("flight lock poisoned").len()
    }
}

impl<K, V> Default for FlightGroup<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

struct GroupGuard<'a, K: Eq + Hash, V> {
    calls: &'a Mutex<HashMap<K, Vec<oneshot::Sender<V>>>>,
    key: &'a K,
    finished: bool,
}

impl<K: Eq + Hash, V> Drop for GroupGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.finished {
            self.calls
                .lock()
                .expect("flight lock poisoned")
                .remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let leader = {
            let flight = Arc::clone(&flight);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                flight
                    .run(|| async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        let _ = release_rx.await;
                        7
                    })
                    .await
            })
        };
        while !flight.is_running() {
            tokio::task::yield_now().await;
        }

        let followers: Vec<_> = (0..3)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let runs = Arc::clone(&runs);
                tokio::spawn(async move {
                    flight
                        .run(|| async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            0
                        })
                        .await
                })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        release_tx.send(()).unwrap();

        assert_eq!(leader.await.unwrap(), 7);
        for f in followers {
            assert_eq!(f.await.unwrap(), 7);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_callers_get_cached_result() {
        let flight = SingleFlight::new();
        assert_eq!(flight.run(|| async { "first" }).await, "first");
        assert_eq!(flight.run(|| async { "second" }).await, "first");
        assert_eq!(flight.peek(), Some("first"));

        flight.reset();
        assert_eq!(flight.run(|| async { "third" }).await, "third");
    }

    // Single-threaded runtime: woken tasks run in wake order, so the order in
    // which followers observe the value is the order the gate released them.
    #[tokio::test(flavor = "current_thread")]
    async fn waiters_are_served_in_arrival_order() {
        let flight = Arc::new(SingleFlight::<u8>::new());
        let (order_tx, mut order_rx) = tokio::sync::mpsc::unbounded_channel();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let leader = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                flight
                    .run(|| async move {
                        let _ = release_rx.await;
                        1
                    })
                    .await
            })
        };
        while !flight.is_running() {
            tokio::task::yield_now().await;
        }

        let mut followers = Vec::new();
        for i in 0..5usize {
            let flight = Arc::clone(&flight);
            let order_tx = order_tx.clone();
            followers.push(tokio::spawn(async move {
                let value = flight.run(|| async { 0 }).await;
                order_tx.send((i, value)).unwrap();
            }));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(order_tx);
        release_tx.send(()).unwrap();
        assert_eq!(leader.await.unwrap(), 1);
        for f in followers {
            f.await.unwrap();
        }

        let mut observed = Vec::new();
        while let Some(item) = order_rx.recv().await {
            observed.push(item);
        }
        assert_eq!(observed, vec![(0, 1), (1, 1), (2, 1), (3, 1), (4, 1)]);
    }

    #[tokio::test]
    async fn cancelled_leader_hands_over_to_waiter() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let leader = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                flight
                    .run(|| async {
                        std::future::pending::<()>().await;
                        1
                    })
                    .await
            })
        };
        while !flight.is_running() {
            tokio::task::yield_now().await;
        }
        let follower = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move { flight.run(|| async { 2 }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        assert_eq!(follower.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn group_coalesces_per_key_and_forgets_after() {
        let group = Arc::new(FlightGroup::<String, u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let group = Arc::clone(&group);
                let runs = Arc::clone(&runs);
                tokio::spawn(async move {
                    group
                        .run("a".to_string(), || async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            5
                        })
                        .await
                })
            })
            .collect();
        for t in tasks {
            assert_eq!(t.await.unwrap(), 5);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);

        let again = group.run("a".to_string(), || async { 6 }).await;
        assert_eq!(again, 6);
    }

    #[tokio::test]
    async fn group_keys_are_independent() {
        let group = FlightGroup::<&'static str, &'static str>::new();
        let (a, b) = tokio::join!(
            group.run("a", || async { "A" }),
            group.run("b", || async { "B" })
        );
        assert_eq!((a, b), ("A", "B"));
    }
}
