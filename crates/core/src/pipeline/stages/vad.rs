use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::domain::segmenter::SpeechSegmenter;
use crate::audio::domain::speech_segment::{AudioChunk, SpeechSegment};
use crate::pipeline::health::StageHealth;
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::queue::BoundedQueue;

pub const STAGE_NAME: &str = "vad";

const POP_WAIT: Duration = Duration::from_millis(500);

/// Gates the transcription path: chunks go through the segmenter and only
/// closed speech segments reach the workers. The trailing segment is
/// flushed when the audio queue closes so the last utterance of a stream
/// still gets transcribed.
pub fn run(
    mut segmenter: SpeechSegmenter,
    vad_in: BoundedQueue<AudioChunk>,
    speech: BoundedQueue<SpeechSegment>,
    metrics: Arc<PipelineMetrics>,
    health: Arc<StageHealth>,
) {
    health.register(STAGE_NAME);
    loop {
        health.heartbeat(STAGE_NAME);
        match vad_in.pop_timeout(POP_WAIT) {
            Ok(Some(chunk)) => {
                if let Some(segment) = segmenter.push(&chunk) {
                    emit(&speech, segment, &metrics);
                }
            }
            Ok(None) => {}
            Err(_) => break,
        }
    }
    if let Some(segment) = segmenter.flush() {
        emit(&speech, segment, &metrics);
    }
    speech.close();
    health.mark_stopped(STAGE_NAME);
    log::info!("VAD stage stopped");
}

fn emit(speech: &BoundedQueue<SpeechSegment>, segment: SpeechSegment, metrics: &PipelineMetrics) {
    log::debug!(
        "Speech segment closed: {:.0}ms at {:.2}s",
        segment.duration_ms(),
        segment.start_time
    );
    metrics.speech_segments.fetch_add(1, Ordering::Relaxed);
    speech.push(segment);
}
