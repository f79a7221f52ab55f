//! Session registry
//!
//! Owns the profiling and device-profiling session tables and hands out the
//! process-wide identifiers (sessions, records, kernel dispatches). Each table
//! has its own lock and no hardware call is made while either lock is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rocscope_shared::{AgentKind, ReplayMode, SessionId};
use tracing::{debug, info, warn};

use super::device::DeviceProfileSession;
use super::signals::{InflightGuard, InflightSignals, PENDING_SIGNAL_TIMEOUT};
use super::{Session, SessionState};
use crate::error::{ProfilerError, Result};
use crate::hardware::HardwareBackend;

pub struct SessionRegistry {
    hardware: Arc<dyn HardwareBackend>,

    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    device_sessions: Mutex<HashMap<SessionId, Arc<DeviceProfileSession>>>,

    /// Shared by both tables; starts at 1 so 0 never names a session
    next_session_id: AtomicU64,
    next_record_id: AtomicU64,
    next_kernel_dispatch_id: AtomicU64,
    current_session: AtomicU64,

    inflight: InflightSignals,
}

impl SessionRegistry {
    pub fn new(hardware: Arc<dyn HardwareBackend>) -> Self {
        Self {
            hardware,
            sessions: Mutex::new(HashMap::new()),
            device_sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            next_record_id: AtomicU64::new(1),
            next_kernel_dispatch_id: AtomicU64::new(1),
            current_session: AtomicU64::new(SessionId::NONE.0),
            inflight: InflightSignals::new(),
        }
    }

    pub fn hardware(&self) -> &Arc<dyn HardwareBackend> {
        &self.hardware
    }

    fn generate_session_id(&self) -> SessionId {
        SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn create_session(&self, replay_mode: ReplayMode) -> SessionId {
        let id = self.generate_session_id();
        let session = Arc::new(Session::new(id, replay_mode));
        self.sessions.lock().unwrap().insert(id, session);
        debug!(session = %id, %replay_mode, "session created");
        id
    }

    pub fn find_session(&self, id: SessionId) -> bool {
        self.sessions.lock().unwrap().contains_key(&id)
    }

    pub fn get_session(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(ProfilerError::SessionNotFound(id))
    }

    /// Mark a session started and make it the current one
    pub fn start_session(&self, id: SessionId) -> Result<()> {
        let session = self.get_session(id)?;
        session.set_state(SessionState::Started);
        self.set_current_active_session(id);
        info!(session = %id, "session started");
        Ok(())
    }

    /// Mark a session terminated; it stops being current if it was
    pub fn terminate_session(&self, id: SessionId) -> Result<()> {
        let session = self.get_session(id)?;
        session.set_state(SessionState::Terminated);
        self.clear_current_if(id);
        info!(session = %id, "session terminated");
        Ok(())
    }

    /// Remove a session once no interrupt handler is in flight, then give its
    /// pending signals a bounded time to drain before releasing it.
    pub fn destroy_session(&self, id: SessionId) -> Result<()> {
        self.inflight.wait_idle();

        let session = self
            .sessions
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or(ProfilerError::SessionNotFound(id))?;
        self.clear_current_if(id);

        if !session.wait_for_pending(PENDING_SIGNAL_TIMEOUT) {
            warn!(session = %id, "session destroyed with signals still pending");
        }
        debug!(session = %id, "session destroyed");
        Ok(())
    }

    /// Resolve the agents by index and register a device-profiling session
    pub fn create_device_profiling_session(
        &self,
        counters: Vec<String>,
        cpu_agent_index: u32,
        gpu_agent_index: u32,
    ) -> Result<SessionId> {
        let cpu_agent = self
            .hardware
            .find_agent(AgentKind::Cpu, cpu_agent_index)
            .ok_or(ProfilerError::AgentNotFound {
                kind: "cpu",
                index: cpu_agent_index,
            })?;
        let gpu_agent = self
            .hardware
            .find_agent(AgentKind::Gpu, gpu_agent_index)
            .ok_or(ProfilerError::AgentNotFound {
                kind: "gpu",
                index: gpu_agent_index,
            })?;

        let id = self.generate_session_id();
        let session = Arc::new(DeviceProfileSession::new(id, counters, cpu_agent, gpu_agent));
        self.device_sessions.lock().unwrap().insert(id, session);
        debug!(session = %id, gpu = gpu_agent_index, "device profiling session created");
        Ok(id)
    }

    pub fn destroy_device_profiling_session(&self, id: SessionId) -> Result<()> {
        self.device_sessions
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or(ProfilerError::DeviceSessionNotFound(id))?;
        debug!(session = %id, "device profiling session destroyed");
        Ok(())
    }

    pub fn get_device_profiling_session(&self, id: SessionId) -> Result<Arc<DeviceProfileSession>> {
        self.device_sessions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(ProfilerError::DeviceSessionNotFound(id))
    }

    pub fn find_device_profiling_session(&self, id: SessionId) -> bool {
        self.device_sessions.lock().unwrap().contains_key(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn device_session_count(&self) -> usize {
        self.device_sessions.lock().unwrap().len()
    }

    pub fn unique_record_id(&self) -> u64 {
        self.next_record_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn unique_kernel_dispatch_id(&self) -> u64 {
        self.next_kernel_dispatch_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn set_current_active_session(&self, id: SessionId) {
        self.current_session.store(id.0, Ordering::SeqCst);
    }

    pub fn current_session_id(&self) -> SessionId {
        SessionId(self.current_session.load(Ordering::SeqCst))
    }

    pub fn has_active_session(&self) -> bool {
        !self.current_session_id().is_none()
    }

    pub fn is_active_session(&self, id: SessionId) -> bool {
        self.current_session_id() == id
    }

    fn clear_current_if(&self, id: SessionId) {
        let _ = self.current_session.compare_exchange(
            id.0,
            SessionId::NONE.0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Count an interrupt handler as in flight until the guard drops.
    /// [`destroy_session`](Self::destroy_session) waits for all of them.
    pub fn begin_interrupt(&self) -> InflightGuard<'_> {
        self.inflight.enter()
    }

    pub fn inflight_interrupts(&self) -> usize {
        self.inflight.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedDevice;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(SimulatedDevice::new("gfx942", 1)))
    }

    #[test]
    fn test_create_find_destroy() {
        let reg = registry();
        let id = reg.create_session(ReplayMode::Kernel);
        assert!(!id.is_none());
        assert!(reg.find_session(id));
        assert_eq!(reg.get_session(id).unwrap().id(), id);

        reg.destroy_session(id).unwrap();
        assert!(!reg.find_session(id));
        assert!(matches!(
            reg.get_session(id),
            Err(ProfilerError::SessionNotFound(s)) if s == id
        ));
        assert!(matches!(
            reg.destroy_session(id),
            Err(ProfilerError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let reg = registry();
        let a = reg.create_session(ReplayMode::Kernel);
        reg.destroy_session(a).unwrap();
        let b = reg.create_session(ReplayMode::Kernel);
        assert!(b > a);
    }

    #[test]
    fn test_start_and_terminate_track_current() {
        let reg = registry();
        let id = reg.create_session(ReplayMode::Application);
        assert!(!reg.has_active_session());

        reg.start_session(id).unwrap();
        assert!(reg.is_active_session(id));
        assert_eq!(reg.get_session(id).unwrap().state(), SessionState::Started);

        reg.terminate_session(id).unwrap();
        assert!(!reg.has_active_session());
        assert_eq!(reg.get_session(id).unwrap().state(), SessionState::Terminated);
    }

    #[test]
    fn test_terminate_other_session_keeps_current() {
        let reg = registry();
        let a = reg.create_session(ReplayMode::Kernel);
        let b = reg.create_session(ReplayMode::Kernel);
        reg.start_session(a).unwrap();
        reg.terminate_session(b).unwrap();
        assert!(reg.is_active_session(a));
    }

    #[test]
    fn test_device_session_lifecycle() {
        let reg = registry();
        let id = reg
            .create_device_profiling_session(vec!["SQ_WAVES".to_string()], 0, 0)
            .unwrap();
        assert!(reg.find_device_profiling_session(id));
        assert!(!reg.find_session(id));
        let session = reg.get_device_profiling_session(id).unwrap();
        assert_eq!(session.counters(), ["SQ_WAVES".to_string()]);

        reg.destroy_device_profiling_session(id).unwrap();
        assert_eq!(reg.device_session_count(), 0);
        assert!(matches!(
            reg.get_device_profiling_session(id),
            Err(ProfilerError::DeviceSessionNotFound(_))
        ));
    }

    #[test]
    fn test_device_session_bad_agent() {
        let reg = registry();
        assert!(matches!(
            reg.create_device_profiling_session(Vec::new(), 0, 3),
            Err(ProfilerError::AgentNotFound { kind: "gpu", index: 3 })
        ));
        assert!(matches!(
            reg.create_device_profiling_session(Vec::new(), 9, 0),
            Err(ProfilerError::AgentNotFound { kind: "cpu", index: 9 })
        ));
        assert_eq!(reg.device_session_count(), 0);
    }

    #[test]
    fn test_unique_ids_increase() {
        let reg = registry();
        let r1 = reg.unique_record_id();
        let r2 = reg.unique_record_id();
        assert!(r2 > r1);
        let k1 = reg.unique_kernel_dispatch_id();
        assert_eq!(reg.unique_kernel_dispatch_id(), k1 + 1);
    }

    #[test]
    fn test_interrupt_guard() {
        let reg = registry();
        {
            let _guard = reg.begin_interrupt();
            assert_eq!(reg.inflight_interrupts(), 1);
        }
        assert_eq!(reg.inflight_interrupts(), 0);
    }
}
