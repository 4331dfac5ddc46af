pub mod segmenter;
pub mod speech_recognizer;
pub mod speech_segment;
pub mod voice_activity;
