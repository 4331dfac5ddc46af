use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::domain::speech_segment::AudioChunk;
use crate::pipeline::health::StageHealth;
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::queue::BoundedQueue;

pub const STAGE_NAME: &str = "audio";

const POP_WAIT: Duration = Duration::from_millis(500);

/// Audio fan-out: every chunk goes to the egress queue, and a copy feeds
/// the VAD when transcription is enabled. Audio itself is relayed
/// untouched; only the video carries redaction.
pub fn run(
    audio_in: BoundedQueue<AudioChunk>,
    audio_out: BoundedQueue<AudioChunk>,
    vad_in: Option<BoundedQueue<AudioChunk>>,
    metrics: Arc<PipelineMetrics>,
    health: Arc<StageHealth>,
) {
    health.register(STAGE_NAME);
    loop {
        health.heartbeat(STAGE_NAME);
        match audio_in.pop_timeout(POP_WAIT) {
            Ok(Some(chunk)) => {
                metrics.audio_chunks.fetch_add(1, Ordering::Relaxed);
                if let Some(vad_in) = &vad_in {
                    vad_in.push(chunk.clone());
                }
                audio_out.push(chunk);
            }
            Ok(None) => {}
            Err(_) => break,
        }
    }
    if let Some(vad_in) = &vad_in {
        vad_in.close();
    }
    audio_out.close();
    health.mark_stopped(STAGE_NAME);
    log::info!("Audio stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::OverflowPolicy;

    fn chunk(timestamp: f64) -> AudioChunk {
        AudioChunk::new(vec![0.1; 160], timestamp)
    }

    #[test]
    fn test_chunks_fan_out_to_both_queues() {
        let audio_in = BoundedQueue::new("audio_in", 8, OverflowPolicy::DropOldest);
        let audio_out = BoundedQueue::new("audio_out", 8, OverflowPolicy::DropOldest);
        let vad_in = BoundedQueue::new("vad_in", 8, OverflowPolicy::DropOldest);

        audio_in.push(chunk(0.0));
        audio_in.push(chunk(0.1));
        audio_in.close();

        let metrics = Arc::new(PipelineMetrics::new());
        run(
            audio_in,
            audio_out.clone(),
            Some(vad_in.clone()),
            metrics.clone(),
            Arc::new(StageHealth::new()),
        );

        assert_eq!(audio_out.len(), 2);
        assert_eq!(vad_in.len(), 2);
        assert!(audio_out.is_closed());
        assert!(vad_in.is_closed());
        assert_eq!(metrics.snapshot().audio_chunks, 2);
    }

    #[test]
    fn test_runs_without_vad_queue() {
        let audio_in = BoundedQueue::new("audio_in", 8, OverflowPolicy::DropOldest);
        let audio_out = BoundedQueue::new("audio_out", 8, OverflowPolicy::DropOldest);
        audio_in.push(chunk(0.0));
        audio_in.close();

        run(
            audio_in,
            audio_out.clone(),
            None,
            Arc::new(PipelineMetrics::new()),
            Arc::new(StageHealth::new()),
        );
        assert_eq!(audio_out.len(), 1);
    }
}
