use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::health::StageHealth;
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::queue::BoundedQueue;
use crate::pipeline::shutdown::ShutdownToken;

/// Consecutive full samples before a queue is reported as persistently
/// full.
const FULL_STRIKES: u32 = 3;

/// Intervals between periodic summary log lines.
const SUMMARY_EVERY: u64 = 6;

/// A named depth gauge over one pipeline queue, type-erased so the monitor
/// can sample heterogeneous queues in one pass. `consumer` names the stage
/// that drains the queue; it is the one flagged when the queue stays full.
pub struct QueueProbe {
    name: &'static str,
    consumer: &'static str,
    capacity: usize,
    depth: Box<dyn Fn() -> usize + Send>,
}

impl QueueProbe {
    pub fn of<T: Send + 'static>(queue: &BoundedQueue<T>, consumer: &'static str) -> Self {
        let name = queue.name();
        let capacity = queue.capacity();
        let queue = queue.clone();
        Self {
            name,
            consumer,
            capacity,
            depth: Box::new(move || queue.len()),
        }
    }
}

/// Observe-only health monitor. Samples queue depths into the metrics,
/// flags stages with stale heartbeats as degraded and logs a periodic
/// summary. It never restarts anything.
pub fn run(
    health: Arc<StageHealth>,
    metrics: Arc<PipelineMetrics>,
    probes: Vec<QueueProbe>,
    interval: Duration,
    health_timeout: Duration,
    shutdown: ShutdownToken,
) {
    let mut full_streaks: HashMap<&'static str, u32> = HashMap::new();
    let mut ticks: u64 = 0;

    while !shutdown.is_triggered() {
        sleep_interruptible(interval, &shutdown);
        if shutdown.is_triggered() {
            break;
        }

        for probe in &probes {
            let depth = (probe.depth)();
            metrics.update_queue_depth(probe.name, depth);
            let streak = full_streaks.entry(probe.name).or_insert(0);
            if depth >= probe.capacity {
                *streak += 1;
                if *streak == FULL_STRIKES {
                    log::warn!(
                        "Queue {} full for {FULL_STRIKES} consecutive samples, {} is not keeping up",
                        probe.name,
                        probe.consumer
                    );
                    health.mark_degraded(probe.consumer, "feed queue persistently full");
                }
            } else {
                *streak = 0;
            }
        }

        for stage in health.stale_stages(health_timeout) {
            health.mark_degraded(stage, "heartbeat stale");
        }

        ticks += 1;
        if ticks % SUMMARY_EVERY == 0 {
            metrics.log_summary();
        }
    }
    log::info!("Monitor stopped");
}

fn sleep_interruptible(duration: Duration, shutdown: &ShutdownToken) {
    let tick = Duration::from_millis(50);
    let mut remaining = duration;
    while remaining > Duration::ZERO && !shutdown.is_triggered() {
        let step = remaining.min(tick);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::health::StageStatus;
    use crate::pipeline::queue::OverflowPolicy;

    #[test]
    fn test_queue_depths_sampled_into_metrics() {
        let queue: BoundedQueue<u32> = BoundedQueue::new("video_in", 4, OverflowPolicy::DropOldest);
        queue.push(1);
        queue.push(2);

        let health = Arc::new(StageHealth::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let shutdown = ShutdownToken::new();

        let handle = {
            let (health, metrics, shutdown) = (health.clone(), metrics.clone(), shutdown.clone());
            let probes = vec![QueueProbe::of(&queue, "video")];
            std::thread::spawn(move || {
                run(
                    health,
                    metrics,
                    probes,
                    Duration::from_millis(10),
                    Duration::from_secs(60),
                    shutdown,
                )
            })
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if metrics.snapshot().queue_depths.get("video_in") == Some(&2) {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "depth never sampled");
            std::thread::sleep(Duration::from_millis(5));
        }
        shutdown.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn test_persistently_full_queue_degrades_consumer() {
        let queue: BoundedQueue<u32> = BoundedQueue::new("video_in", 1, OverflowPolicy::DropOldest);
        queue.push(1);

        let health = Arc::new(StageHealth::new());
        health.register("video");
        let metrics = Arc::new(PipelineMetrics::new());
        let shutdown = ShutdownToken::new();

        let handle = {
            let (health, metrics, shutdown) = (health.clone(), metrics.clone(), shutdown.clone());
            let probes = vec![QueueProbe::of(&queue, "video")];
            std::thread::spawn(move || {
                run(
                    health,
                    metrics,
                    probes,
                    Duration::from_millis(10),
                    Duration::from_secs(60),
                    shutdown,
                )
            })
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if health.status("video") == Some(StageStatus::Degraded) {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "consumer never degraded");
            std::thread::sleep(Duration::from_millis(5));
        }
        shutdown.trigger();
        handle.join().unwrap();
    }

    #[test]
    fn test_stale_stage_marked_degraded() {
        let health = Arc::new(StageHealth::new());
        health.register("video");
        let metrics = Arc::new(PipelineMetrics::new());
        let shutdown = ShutdownToken::new();

        let handle = {
            let (health, metrics, shutdown) = (health.clone(), metrics.clone(), shutdown.clone());
            std::thread::spawn(move || {
                run(
                    health,
                    metrics,
                    Vec::new(),
                    Duration::from_millis(10),
                    Duration::from_millis(1),
                    shutdown,
                )
            })
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if health.status("video") == Some(StageStatus::Degraded) {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "never degraded");
            std::thread::sleep(Duration::from_millis(5));
        }
        shutdown.trigger();
        handle.join().unwrap();
    }
}
