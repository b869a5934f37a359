use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::error;

use crate::error::{BarrierError, BarrierResult};

type Continuation = Box<dyn FnOnce() + Send + 'static>;

/// Counts completions up to a fixed target and then fires a continuation
/// exactly once.
///
/// A target of zero fires the continuation synchronously inside the
/// constructor. Incrementing past the target is rejected with
/// [`BarrierError::Overflow`]; the counter saturates and the continuation is
/// never fired a second time.
pub struct CountingBarrier {
    target: usize,
    count: AtomicUsize,
    continuation: Mutex<Option<Continuation>>,
}

impl CountingBarrier {
    pub fn new<F>(target: usize, continuation: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let barrier = Self {
            target,
            count: AtomicUsize::new(0),
            continuation: Mutex::new(Some(Box::new(continuation))),
        };
        if target == 0 {
            barrier.fire();
        }
        barrier
    }

    /// A barrier whose continuation resolves the returned [`BarrierSignal`].
    pub fn with_signal(target: usize) -> (Self, BarrierSignal) {
        let (tx, rx) = oneshot::channel();
        let barrier = Self::new(target, move || {
            let _ = tx.send(());
        });
        (barrier, BarrierSignal { rx })
    }

    /// Record one completion. Returns the number of completions so far.
    pub fn increment(&self) -> BarrierResult<usize> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current >= self.target {
                error!(target = self.target, "barrier incremented past its target");
                return Err(BarrierError::Overflow {
                    target: self.target,
                });
            }
            match self.count.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        let reached = current + 1;
        if reached == self.target {
            self.fire();
        }
        Ok(reached)
    }

    /// A guard that records one completion when dropped or completed.
    pub fn ticket(self: &Arc<Self>) -> BarrierTicket {
        BarrierTicket {
            barrier: Some(Arc::clone(self)),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn completed(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.completed() >= self.target
    }

    fn fire(&self) {
        let continuation = self
            .continuation
            .lock()
            .expect("barrier lock poisoned")
            .take();
        if let Some(continuation) = continuation {
            continuation();
        }
    }
}

impl fmt::Debug for CountingBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingBarrier")
            .field("target", &self.target)
            .field("completed", &self.completed())
            .finish()
    }
}

/// Resolves once the owning barrier's continuation has fired.
#[derive(Debug)]
pub struct BarrierSignal {
    rx: oneshot::Receiver<()>,
}

impl BarrierSignal {
    pub async fn wait(self) -> BarrierResult<()> {
        self.rx.await.map_err(|_| BarrierError::Abandoned)
    }
}

/// One expected completion of a [`CountingBarrier`].
///
/// Dropping the ticket counts as completion, so a task that bails out early
/// (or panics) still advances the barrier and the fan-in cannot hang.
#[derive(Debug)]
pub struct BarrierTicket {
    barrier: Option<Arc<CountingBarrier>>,
}

impl BarrierTicket {
    pub fn complete(mut self) -> BarrierResult<usize> {
        match self.barrier.take() {
            Some(barrier) => barrier.increment(),
            None => Err(BarrierError::Abandoned),
        }
    }
}

impl Drop for BarrierTicket {
    fn drop(&mut self) {
        if let Some(barrier) = self.barrier.take() {
            let _ = barrier.increment();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn counting(target: usize) -> (CountingBarrier, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&fired);
        let barrier = CountingBarrier::new(target, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (barrier, fired)
    }

    #[test]
    fn zero_target_fires_synchronously() {
        let fired = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&fired);
        let barrier = CountingBarrier::new(0, move || inner.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
        assert!(barrier.is_complete());
    }

    #[test]
    fn fires_exactly_once_after_third_increment() {
        let (barrier, fired) = counting(3);
        assert_eq!(barrier.increment().unwrap(), 1);
        assert_eq!(barrier.increment().unwrap(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(barrier.increment().unwrap(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overflow_is_rejected_and_saturates() {
        let (barrier, fired) = counting(1);
        barrier.increment().unwrap();
        assert_eq!(
            barrier.increment(),
            Err(BarrierError::Overflow { target: 1 })
        );
        assert_eq!(barrier.completed(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_ticket_counts_as_completion() {
        let (barrier, fired) = counting(2);
        let barrier = Arc::new(barrier);
        let a = barrier.ticket();
        let b = barrier.ticket();
        assert_eq!(a.complete().unwrap(), 1);
        drop(b);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_increments_fire_once() {
        let (barrier, fired) = counting(64);
        let barrier = Arc::new(barrier);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    for _ in 0..8 {
                        b.increment().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(barrier.is_complete());
    }

    #[tokio::test]
    async fn signal_resolves_when_target_reached() {
        let (barrier, signal) = CountingBarrier::with_signal(2);
        let barrier = Arc::new(barrier);
        let tickets: Vec<_> = (0..2).map(|_| barrier.ticket()).collect();
        let handle = tokio::spawn(async move { signal.wait().await });
        for t in tickets {
            tokio::spawn(async move {
                drop(t);
            });
        }
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn signal_reports_abandoned_barrier() {
        let (barrier, signal) = CountingBarrier::with_signal(3);
        drop(barrier);
        assert_eq!(signal.wait().await, Err(BarrierError::Abandoned));
    }
}
