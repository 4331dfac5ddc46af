use crate::shared::constants::AUDIO_SAMPLE_RATE;

/// A short run of decoded audio: mono f32 samples at the pipeline rate.
/// Chunks flow from the demuxer to both the egress encoder and the VAD.
#[derive(Clone, Debug)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    /// Stream timestamp of the first sample, in seconds.
    pub timestamp: f64,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, timestamp: f64) -> Self {
        Self { samples, timestamp }
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / AUDIO_SAMPLE_RATE as f64
    }
}

/// A contiguous voiced region assembled by the VAD, ready for
/// transcription.
#[derive(Clone, Debug)]
pub struct SpeechSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Stream timestamp where the voiced region began, in seconds.
    pub start_time: f64,
}

impl SpeechSegment {
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_duration() {
        let chunk = AudioChunk::new(vec![0.0; 1600], 2.0);
        assert!((chunk.duration_ms() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_segment_duration() {
        let segment = SpeechSegment {
            samples: vec![0.0; 8000],
            sample_rate: 16_000,
            start_time: 0.0,
        };
        assert!((segment.duration_ms() - 500.0).abs() < 1e-9);
    }
}
