pub mod audio;
pub mod input;
pub mod output;
pub mod transcribe;
pub mod vad;
pub mod video;
