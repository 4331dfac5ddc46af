use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Coarse per-stage condition as judged by the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageStatus {
    Running,
    /// Heartbeat went stale or a queue is persistently full. Degraded
    /// stages keep passing data; nothing is auto-restarted.
    Degraded,
    Stopped,
}

struct StageEntry {
    status: StageStatus,
    last_heartbeat: Instant,
}

/// Heartbeat registry shared by every stage thread and read by the
/// monitor. Stages beat once per loop iteration; a stale beat flags the
/// stage degraded, never restarts it.
#[derive(Default)]
pub struct StageHealth {
    stages: Mutex<HashMap<&'static str, StageEntry>>,
}

impl StageHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &'static str) {
        self.stages.lock().expect("health lock poisoned").insert(
            name,
            StageEntry {
                status: StageStatus::Running,
                last_heartbeat: Instant::now(),
            },
        );
        log::debug!("Registered stage: {name}");
    }

    pub fn heartbeat(&self, name: &'static str) {
        if let Some(entry) = self
            .stages
            .lock()
            .expect("health lock poisoned")
            .get_mut(name)
        {
            entry.last_heartbeat = Instant::now();
            if entry.status == StageStatus::Degraded {
                entry.status = StageStatus::Running;
                log::info!("Stage {name} recovered");
            }
        }
    }

    pub fn mark_degraded(&self, name: &'static str, reason: &str) {
        if let Some(entry) = self
            .stages
            .lock()
            .expect("health lock poisoned")
            .get_mut(name)
        {
            if entry.status == StageStatus::Running {
                entry.status = StageStatus::Degraded;
                log::warn!("Stage {name} degraded: {reason}");
            }
        }
    }

    pub fn mark_stopped(&self, name: &'static str) {
        if let Some(entry) = self
            .stages
            .lock()
            .expect("health lock poisoned")
            .get_mut(name)
        {
            entry.status = StageStatus::Stopped;
        }
    }

    pub fn status(&self, name: &'static str) -> Option<StageStatus> {
        self.stages
            .lock()
            .expect("health lock poisoned")
            .get(name)
            .map(|e| e.status)
    }

    /// Names of running stages whose last heartbeat is older than `timeout`.
    pub fn stale_stages(&self, timeout: Duration) -> Vec<&'static str> {
        let now = Instant::now();
        self.stages
            .lock()
            .expect("health lock poisoned")
            .iter()
            .filter(|(_, e)| {
                e.status == StageStatus::Running
                    && now.duration_since(e.last_heartbeat) > timeout
            })
            .map(|(name, _)| *name)
            .collect()
    }
}
