use crate::audio::domain::speech_segment::AudioChunk;
use crate::shared::frame::Frame;
use crate::stream::domain::media::StreamInfo;

/// Egress side of the relay. Frames and audio are written in arrival
/// order; the sink owns encoding and timestamping.
pub trait StreamSink: Send {
    fn open(&mut self, info: &StreamInfo) -> Result<(), Box<dyn std::error::Error>>;
    fn write_video(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;
    fn write_audio(&mut self, chunk: &AudioChunk) -> Result<(), Box<dyn std::error::Error>>;
    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}
