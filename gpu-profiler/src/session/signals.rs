//! Completion-signal bookkeeping
//!
//! Two waits guard session teardown. [`InflightSignals`] counts interrupt
//! handlers currently running on behalf of any session; a destroyer blocks until
//! it reaches zero. [`PendingSignals`] holds the kernel-completion signals a
//! session still expects, grouped by the writer thread that will drain them.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

/// How long a destroyed session waits for its pending signals to drain
pub const PENDING_SIGNAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Number of in-flight interrupt handlers, with a wake-up for waiters at zero
#[derive(Debug, Default)]
pub struct InflightSignals {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InflightSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one in-flight handler until the guard is dropped
    pub fn enter(&self) -> InflightGuard<'_> {
        *self.count.lock().unwrap() += 1;
        InflightGuard { signals: self }
    }

    pub fn count(&self) -> usize {
        *self.count.lock().unwrap()
    }

    /// Block until no handler is in flight
    pub fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.drained.wait(count).unwrap();
        }
    }

    fn leave(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }
}

/// Marks one interrupt handler as running; see [`InflightSignals::enter`]
#[must_use = "the handler is only counted while the guard is alive"]
#[derive(Debug)]
pub struct InflightGuard<'a> {
    signals: &'a InflightSignals,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.signals.leave();
    }
}

/// A kernel-completion signal that has not been processed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSignal {
    /// Driver signal handle
    pub handle: u64,
    pub kernel_dispatch_id: u64,
}

/// Pending signals of one session, keyed by writer id
#[derive(Debug, Default)]
pub struct PendingSignals {
    by_writer: Mutex<HashMap<u64, Vec<PendingSignal>>>,
    empty: Condvar,
}

impl PendingSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, writer_id: u64, signal: PendingSignal) {
        self.by_writer
            .lock()
            .unwrap()
            .entry(writer_id)
            .or_default()
            .push(signal);
    }

    /// Take every signal queued for `writer_id`
    pub fn take(&self, writer_id: u64) -> Vec<PendingSignal> {
        let mut by_writer = self.by_writer.lock().unwrap();
        let taken = by_writer.remove(&writer_id).unwrap_or_default();
        if by_writer.is_empty() {
            self.empty.notify_all();
        }
        taken
    }

    /// Total number of queued signals
    pub fn len(&self) -> usize {
        self.by_writer.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_writer.lock().unwrap().is_empty()
    }

    /// Wait up to `timeout` for every writer to drain its signals. Returns
    /// `false` if signals were still pending when the time ran out.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut by_writer = self.by_writer.lock().unwrap();
        while !by_writer.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    writers = by_writer.len(),
                    "timed out waiting for pending signals"
                );
                return false;
            }
            by_writer = self.empty.wait_timeout(by_writer, deadline - now).unwrap().0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_counts_in_flight() {
        let signals = InflightSignals::new();
        {
            let _a = signals.enter();
            let _b = signals.enter();
            assert_eq!(signals.count(), 2);
        }
        assert_eq!(signals.count(), 0);
        signals.wait_idle();
    }

    #[test]
    fn test_wait_idle_blocks_until_guard_dropped() {
        let signals = Arc::new(InflightSignals::new());
        let (tx, rx) = std::sync::mpsc::channel();

        let worker = {
            let signals = signals.clone();
            thread::spawn(move || {
                let _guard = signals.enter();
                tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
            })
        };

        rx.recv().unwrap();
        let start = Instant::now();
        signals.wait_idle();
        assert_eq!(signals.count(), 0);
        assert!(start.elapsed() >= Duration::from_millis(20));
        worker.join().unwrap();
    }

    #[test]
    fn test_pending_signals_per_writer() {
        let pending = PendingSignals::new();
        let sig = |handle| PendingSignal {
            handle,
            kernel_dispatch_id: handle * 10,
        };
        pending.add(1, sig(1));
        pending.add(1, sig(2));
        pending.add(2, sig(3));
        assert_eq!(pending.len(), 3);

        assert_eq!(pending.take(1), vec![sig(1), sig(2)]);
        assert!(pending.take(1).is_empty());
        assert!(!pending.is_empty());
        assert_eq!(pending.take(2).len(), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_wait_empty_times_out() {
        let pending = PendingSignals::new();
        pending.add(7, PendingSignal {
            handle: 1,
            kernel_dispatch_id: 1,
        });
        assert!(!pending.wait_empty(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_empty_wakes_on_drain() {
        let pending = Arc::new(PendingSignals::new());
        pending.add(7, PendingSignal {
            handle: 1,
            kernel_dispatch_id: 1,
        });

        let drainer = {
            let pending = pending.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                pending.take(7);
            })
        };

        assert!(pending.wait_empty(Duration::from_secs(5)));
        drainer.join().unwrap();
    }
}
