//! Device-profiling sessions
//!
//! A device-profiling session samples a fixed counter list on one GPU agent
//! outside of any kernel dispatch. It runs the metric engine end to end:
//! [`prepare`](DeviceProfileSession::prepare) resolves the counters into
//! hardware events, [`read`](DeviceProfileSession::read) turns a captured
//! buffer into metric values.

use std::sync::Mutex;
use std::time::Duration;

use rocscope_shared::{Agent, SessionId};
use tracing::{debug, info};

use crate::error::Result;
use crate::hardware::{HardwareBackend, ProfileBuffer};
use crate::metrics::{
    evaluate, get_metrics_data, resolve_metrics, MetricCatalog, MetricEngine, MetricSnapshot,
    ProfilePass, ResultView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSessionState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug)]
pub struct DeviceProfileSession {
    id: SessionId,
    counters: Vec<String>,
    cpu_agent: Agent,
    gpu_agent: Agent,
    state: Mutex<DeviceSessionState>,
}

impl DeviceProfileSession {
    pub fn new(id: SessionId, counters: Vec<String>, cpu_agent: Agent, gpu_agent: Agent) -> Self {
        Self {
            id,
            counters,
            cpu_agent,
            gpu_agent,
            state: Mutex::new(DeviceSessionState::Idle),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn counters(&self) -> &[String] {
        &self.counters
    }

    pub fn cpu_agent(&self) -> &Agent {
        &self.cpu_agent
    }

    pub fn gpu_agent(&self) -> &Agent {
        &self.gpu_agent
    }

    pub fn state(&self) -> DeviceSessionState {
        *self.state.lock().unwrap()
    }

    /// Resolve the session's counters into the events to program
    pub fn prepare(
        &self,
        engine: &MetricEngine,
        catalog: &dyn MetricCatalog,
    ) -> Result<ProfilePass> {
        let mut pass = ProfilePass::new();
        engine.extract_metric_events(&self.counters, &self.gpu_agent, catalog, &mut pass)?;
        debug!(
            session = %self.id,
            gpu = %self.gpu_agent,
            events = pass.events.len(),
            "device profiling session prepared"
        );
        Ok(pass)
    }

    pub fn start(&self) {
        *self.state.lock().unwrap() = DeviceSessionState::Running;
        info!(session = %self.id, "device profiling started");
    }

    pub fn stop(&self) {
        *self.state.lock().unwrap() = DeviceSessionState::Stopped;
        info!(session = %self.id, "device profiling stopped");
    }

    /// Fold `buffer` into `pass` and evaluate every requested metric over the
    /// totals. `elapsed` is reported as `KERNEL_DURATION` in nanoseconds.
    pub fn read(
        &self,
        engine: &MetricEngine,
        catalog: &dyn MetricCatalog,
        pass: &mut ProfilePass,
        buffer: &ProfileBuffer,
        elapsed: Duration,
    ) -> Result<MetricSnapshot> {
        let duration_ns = elapsed.as_nanos() as u64;
        engine.get_counter_data(buffer, &mut pass.results)?;

        let info = engine.hardware().device_info(&self.gpu_agent)?;
        let metrics = resolve_metrics(&self.counters, catalog, &info.name)?;
        get_metrics_data(&mut pass.results, &metrics, duration_ns)?;
        evaluate(&pass.results, &metrics, duration_ns, ResultView::Aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfilerError;
    use crate::hardware::SimulatedDevice;
    use crate::metrics::{Counter, InMemoryCatalog, KERNEL_DURATION};
    use rocscope_shared::{AgentKind, BlockKind, Event};
    use std::sync::Arc;

    #[test]
    fn test_prepare_and_read() {
        let dev = Arc::new(SimulatedDevice::new("gfx90a", 2));
        let engine = MetricEngine::new(dev.clone());

        let mut catalog = InMemoryCatalog::new();
        catalog
            .add_counter(Counter::new("GRBM_COUNT", Event::new(BlockKind::Grbm, 0, 0)), "")
            .unwrap();
        catalog
            .add_counter(Counter::new("GRBM_GUI_ACTIVE", Event::new(BlockKind::Grbm, 0, 2)), "")
            .unwrap();
        catalog
            .add_derived("GPUBusy", "100*GRBM_GUI_ACTIVE/GRBM_COUNT", "")
            .unwrap();

        let session = DeviceProfileSession::new(
            SessionId(3),
            vec!["GPUBusy".to_string(), KERNEL_DURATION.to_string()],
            dev.find_agent(AgentKind::Cpu, 0).unwrap(),
            dev.gpu(),
        );
        assert_eq!(session.state(), DeviceSessionState::Idle);

        let mut pass = session.prepare(&engine, &catalog).unwrap();
        assert_eq!(pass.events.len(), 2);

        session.start();
        let buffer = dev.capture(&dev.gpu(), &pass.events, |_, e| match e.counter_id {
            0 => 200,
            _ => 50,
        });
        session.stop();
        assert_eq!(session.state(), DeviceSessionState::Stopped);

        let snapshot = session
            .read(&engine, &catalog, &mut pass, &buffer, Duration::from_micros(5))
            .unwrap();
        assert_eq!(snapshot.partition, None);
        assert_eq!(snapshot.get("GRBM_COUNT"), Some(400.0));
        assert_eq!(snapshot.get("GPUBusy"), Some(25.0));
        assert_eq!(snapshot.get(KERNEL_DURATION), Some(5000.0));
        assert_eq!(pass.results.value("GPUBusy"), Some(25.0));
    }

    #[test]
    fn test_read_with_catalog_missing_metric() {
        let dev = Arc::new(SimulatedDevice::new("gfx942", 1));
        let engine = MetricEngine::new(dev.clone());

        let mut full = InMemoryCatalog::new();
        full.add_counter(Counter::new("SQ_WAVES", Event::new(BlockKind::Sq, 0, 4)), "")
            .unwrap();
        full.add_derived("Waves2", "2 * SQ_WAVES", "").unwrap();

        let mut partial = InMemoryCatalog::new();
        partial
            .add_counter(Counter::new("SQ_WAVES", Event::new(BlockKind::Sq, 0, 4)), "")
            .unwrap();

        let session = DeviceProfileSession::new(
            SessionId(4),
            vec!["Waves2".to_string()],
            dev.find_agent(AgentKind::Cpu, 0).unwrap(),
            dev.gpu(),
        );
        let mut pass = session.prepare(&engine, &full).unwrap();
        let buffer = dev.capture(&dev.gpu(), &pass.events, |_, _| 3);

        let err = session
            .read(&engine, &partial, &mut pass, &buffer, Duration::ZERO)
            .unwrap_err();
        match err {
            ProfilerError::UnknownMetric { metric, device } => {
                assert_eq!(metric, "Waves2");
                assert_eq!(device, "gfx942");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
