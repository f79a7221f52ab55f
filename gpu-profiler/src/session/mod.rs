//! Profiling sessions and the registry that owns them

pub mod counters;
pub mod device;
pub mod registry;
pub mod signals;

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rocscope_shared::{CounterId, ReplayMode, SessionId};

pub use counters::CounterTable;
pub use device::{DeviceProfileSession, DeviceSessionState};
pub use registry::SessionRegistry;
pub use signals::{
    InflightGuard, InflightSignals, PendingSignal, PendingSignals, PENDING_SIGNAL_TIMEOUT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Started,
    Terminated,
}

/// A profiling session created through [`SessionRegistry`]
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    replay_mode: ReplayMode,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    counters: CounterTable,
    pending: PendingSignals,
}

impl Session {
    pub(crate) fn new(id: SessionId, replay_mode: ReplayMode) -> Self {
        Self {
            id,
            replay_mode,
            created_at: Utc::now(),
            state: Mutex::new(SessionState::Created),
            counters: CounterTable::new(),
            pending: PendingSignals::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn replay_mode(&self) -> ReplayMode {
        self.replay_mode
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn add_counter_name(&self, name: &str) -> CounterId {
        self.counters.add_counter_name(name)
    }

    pub fn counters(&self) -> &CounterTable {
        &self.counters
    }

    pub fn add_pending_signal(&self, writer_id: u64, signal: PendingSignal) {
        self.pending.add(writer_id, signal);
    }

    /// Drain the signals queued by `writer_id`
    pub fn move_pending_signals(&self, writer_id: u64) -> Vec<PendingSignal> {
        self.pending.take(writer_id)
    }

    pub fn has_pending_signals(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Wait up to `timeout` for all pending signals to be drained
    pub fn wait_for_pending(&self, timeout: Duration) -> bool {
        self.pending.wait_empty(timeout)
    }
}
