use std::path::Path;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::domain::speech_recognizer::SpeechRecognizer;
use crate::audio::domain::speech_segment::SpeechSegment;

/// Speech recognizer using whisper.cpp via whisper-rs.
///
/// The model is loaded once per worker; each transcription runs on a
/// fresh state, so a worker handles segments back to back without
/// reloading weights.
pub struct WhisperTranscriber {
    context: WhisperContext,
}

impl WhisperTranscriber {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !model_path.exists() {
            return Err(format!("Whisper model not found at: {}", model_path.display()).into());
        }
        let context = WhisperContext::new_with_params(
            model_path.to_str().ok_or("Invalid model path")?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| format!("Failed to load Whisper model: {e}"))?;
        Ok(Self { context })
    }
}

impl SpeechRecognizer for WhisperTranscriber {
    fn transcribe(&self, segment: &SpeechSegment) -> Result<String, Box<dyn std::error::Error>> {
        let mut state = self
            .context
            .create_state()
            .map_err(|e| format!("Failed to create Whisper state: {e}"))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 0 });
        params.set_language(Some("en"));
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_n_threads(num_cpus().min(4) as i32);

        state
            .full(params, &segment.samples)
            .map_err(|e| format!("Whisper inference failed: {e}"))?;

        let mut text = String::new();
        for seg_idx in 0..state.full_n_segments() {
            let Some(whisper_segment) = state.get_segment(seg_idx) else {
                continue;
            };
            for tok_idx in 0..whisper_segment.n_tokens() {
                let Some(token) = whisper_segment.get_token(tok_idx) else {
                    continue;
                };
                let Ok(piece) = token.to_str() else {
                    continue;
                };
                // Special tokens ([_BEG_], <|endoftext|>, ...) are markup.
                let trimmed = piece.trim();
                if trimmed.is_empty() || trimmed.starts_with('[') || trimmed.starts_with('<') {
                    continue;
                }
                text.push_str(piece);
            }
        }

        Ok(text.trim().to_string())
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_nonexistent_path_returns_error() {
        let result = WhisperTranscriber::new(Path::new("/nonexistent/model.bin"));
        let err = result.err().expect("expected error").to_string();
        assert!(err.contains("not found"), "unexpected error: {err}");
    }

    #[test]
    #[ignore] // Requires the whisper model file
    fn test_transcribe_does_not_crash_on_sine_wave() {
        let model_path = crate::shared::model_resolver::resolve(
            crate::shared::constants::WHISPER_MODEL_NAME,
            crate::shared::constants::WHISPER_MODEL_URL,
            None,
        )
        .expect("Failed to resolve whisper model");

        let transcriber = WhisperTranscriber::new(&model_path).expect("Failed to load model");
        let sample_rate = 16_000u32;
        let samples: Vec<f32> = (0..sample_rate as usize * 3)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * std::f64::consts::PI * 440.0 * t).sin() as f32
            })
            .collect();
        let segment = SpeechSegment {
            samples,
            sample_rate,
            start_time: 0.0,
        };

        assert!(transcriber.transcribe(&segment).is_ok());
    }
}
