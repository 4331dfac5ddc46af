use crate::audio::domain::speech_segment::{AudioChunk, SpeechSegment};
use crate::audio::domain::voice_activity::VoiceActivityDetector;
use crate::shared::config::VadConfig;

/// Assembles VAD-gated audio chunks into transcribable segments.
///
/// A segment closes when voice ends (including hangover), or early when it
/// hits the maximum length so one long monologue cannot stall
/// transcription. Segments shorter than the minimum are discarded as
/// noise blips.
pub struct SpeechSegmenter {
    vad: VoiceActivityDetector,
    min_samples: usize,
    max_samples: usize,
    sample_rate: u32,
    buffer: Vec<f32>,
    start_time: f64,
}

impl SpeechSegmenter {
    pub fn new(config: &VadConfig, sample_rate: u32) -> Self {
        let per_ms = sample_rate as usize / 1000;
        Self {
            vad: VoiceActivityDetector::new(config.threshold_db, config.hangover_ms, sample_rate),
            min_samples: config.min_segment_ms as usize * per_ms,
            max_samples: config.max_segment_ms as usize * per_ms,
            sample_rate,
            buffer: Vec::new(),
            start_time: 0.0,
        }
    }

    /// Feeds one chunk; returns a finished segment when one closes.
    pub fn push(&mut self, chunk: &AudioChunk) -> Option<SpeechSegment> {
        if self.vad.process(&chunk.samples) {
            if self.buffer.is_empty() {
                self.start_time = chunk.timestamp;
            }
            self.buffer.extend_from_slice(&chunk.samples);
            if self.buffer.len() >= self.max_samples {
                log::debug!("Splitting speech segment at maximum length");
                return self.take_segment();
            }
            None
        } else if !self.buffer.is_empty() {
            self.take_segment()
        } else {
            None
        }
    }

    /// Closes any in-progress segment. Called on stream end so trailing
    /// speech is not lost.
    pub fn flush(&mut self) -> Option<SpeechSegment> {
        self.vad.reset();
        self.take_segment()
    }

    fn take_segment(&mut self) -> Option<SpeechSegment> {
        let samples = std::mem::take(&mut self.buffer);
        if samples.len() < self.min_samples {
            return None;
        }
        Some(SpeechSegment {
            samples,
            sample_rate: self.sample_rate,
            start_time: self.start_time,
        })
    }
}
