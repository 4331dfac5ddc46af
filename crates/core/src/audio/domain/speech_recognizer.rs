use crate::audio::domain::speech_segment::SpeechSegment;

/// Turns a speech segment into plain text. Each transcription worker owns
/// its recognizer state, so implementations only need `Send`.
pub trait SpeechRecognizer: Send {
    fn transcribe(&self, segment: &SpeechSegment) -> Result<String, Box<dyn std::error::Error>>;
}
