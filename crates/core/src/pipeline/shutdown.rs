use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of the whole pipeline, driven by the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    /// Input-side queues are closed; in-flight items still flow to output.
    Draining,
    Stopped,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PipelineState::Starting,
            1 => PipelineState::Running,
            2 => PipelineState::Draining,
            _ => PipelineState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PipelineState::Starting => 0,
            PipelineState::Running => 1,
            PipelineState::Draining => 2,
            PipelineState::Stopped => 3,
        }
    }
}

/// Shared view of the pipeline state, readable from any thread.
#[derive(Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(PipelineState::Starting.as_u8())))
    }

    pub fn set(&self, state: PipelineState) {
        let old = self.0.swap(state.as_u8(), Ordering::SeqCst);
        if old != state.as_u8() {
            log::info!(
                "Pipeline state: {:?} -> {state:?}",
                PipelineState::from_u8(old)
            );
        }
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Global cancellation token. Checked by every stage loop; closing the
/// queues does the rest, so no stage needs its own cancellation logic.
#[derive(Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn trigger(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            log::info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
