use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

/// Window size for the rolling FPS average.
const FPS_WINDOW: usize = 100;

/// Point-in-time view of pipeline health, exposed for the control surface
/// and the end-of-run summary.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub faces_detected: u64,
    pub faces_anonymized: u64,
    pub faces_labeled: u64,
    pub detect_failures: u64,
    pub audio_chunks: u64,
    pub speech_segments: u64,
    pub transcriptions: u64,
    pub consents_granted: u64,
    pub capture_failures: u64,
    pub input_reconnects: u64,
    pub average_fps: f64,
    pub queue_depths: HashMap<&'static str, usize>,
}

/// Lock-free counters shared by every stage, plus a small locked section
/// for the FPS window and queue-depth samples written by the monitor.
#[derive(Default)]
pub struct PipelineMetrics {
    pub frames_processed: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub faces_detected: AtomicU64,
    pub faces_anonymized: AtomicU64,
    pub faces_labeled: AtomicU64,
    pub detect_failures: AtomicU64,
    pub audio_chunks: AtomicU64,
    pub speech_segments: AtomicU64,
    pub transcriptions: AtomicU64,
    pub consents_granted: AtomicU64,
    pub capture_failures: AtomicU64,
    pub input_reconnects: AtomicU64,
    fps: Mutex<FpsWindow>,
    queue_depths: Mutex<HashMap<&'static str, usize>>,
}

#[derive(Default)]
struct FpsWindow {
    last_frame: Option<Instant>,
    samples: Vec<f64>,
    next: usize,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one processed frame and folds the inter-frame interval into
    /// the rolling FPS average.
    pub fn record_frame(&self, faces: usize) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.faces_detected.fetch_add(faces as u64, Ordering::Relaxed);

        let now = Instant::now();
        let mut fps = self.fps.lock().expect("fps lock poisoned");
        if let Some(last) = fps.last_frame {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let sample = 1.0 / dt;
                if fps.samples.len() < FPS_WINDOW {
                    fps.samples.push(sample);
                } else {
                    let next = fps.next;
                    fps.samples[next] = sample;
                    fps.next = (next + 1) % FPS_WINDOW;
                }
            }
        }
        fps.last_frame = Some(now);
    }

    pub fn update_queue_depth(&self, name: &'static str, depth: usize) {
        self.queue_depths
            .lock()
            .expect("queue depth lock poisoned")
            .insert(name, depth);
    }

    pub fn average_fps(&self) -> f64 {
        let fps = self.fps.lock().expect("fps lock poisoned");
        if fps.samples.is_empty() {
            0.0
        } else {
            fps.samples.iter().sum::<f64>() / fps.samples.len() as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            faces_detected: self.faces_detected.load(Ordering::Relaxed),
            faces_anonymized: self.faces_anonymized.load(Ordering::Relaxed),
            faces_labeled: self.faces_labeled.load(Ordering::Relaxed),
            detect_failures: self.detect_failures.load(Ordering::Relaxed),
            audio_chunks: self.audio_chunks.load(Ordering::Relaxed),
            speech_segments: self.speech_segments.load(Ordering::Relaxed),
            transcriptions: self.transcriptions.load(Ordering::Relaxed),
            consents_granted: self.consents_granted.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            input_reconnects: self.input_reconnects.load(Ordering::Relaxed),
            average_fps: self.average_fps(),
            queue_depths: self
                .queue_depths
                .lock()
                .expect("queue depth lock poisoned")
                .clone(),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        log::info!(
            "Pipeline summary: {} frames ({} dropped, {:.1} fps), {} faces \
             ({} labeled / {} anonymized, {} detect failures), {} segments, \
             {} transcriptions, {} consents granted, {} capture failures",
            s.frames_processed,
            s.frames_dropped,
            s.average_fps,
            s.faces_detected,
            s.faces_labeled,
            s.faces_anonymized,
            s.detect_failures,
            s.speech_segments,
            s.transcriptions,
            s.consents_granted,
            s.capture_failures,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_frame_counts() {
        let m = PipelineMetrics::new();
        m.record_frame(2);
        m.record_frame(1);
        let s = m.snapshot();
        assert_eq!(s.frames_processed, 2);
        assert_eq!(s.faces_detected, 3);
    }

    #[test]
    fn test_fps_is_zero_before_second_frame() {
        let m = PipelineMetrics::new();
        m.record_frame(0);
        assert_eq!(m.average_fps(), 0.0);
    }

    #[test]
    fn test_fps_window_fills() {
        let m = PipelineMetrics::new();
        for _ in 0..5 {
            m.record_frame(0);
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert!(m.average_fps() > 0.0);
    }

    #[test]
    fn test_queue_depths_in_snapshot() {
        let m = PipelineMetrics::new();
        m.update_queue_depth("video_in", 3);
        assert_eq!(m.snapshot().queue_depths.get("video_in"), Some(&3));
    }

    #[test]
    fn test_snapshot_serializes() {
        let m = PipelineMetrics::new();
        m.consents_granted.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&m.snapshot()).unwrap();
        assert!(json.contains("\"consents_granted\":1"));
    }
}
