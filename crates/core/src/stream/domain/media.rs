use crate::audio::domain::speech_segment::AudioChunk;
use crate::shared::frame::Frame;

/// Stream properties negotiated at connect time.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub has_audio: bool,
}

/// One demuxed unit from the ingress: a decoded video frame or a run of
/// decoded audio samples. Video and audio interleave in stream order.
#[derive(Debug)]
pub enum MediaEvent {
    Video(Frame),
    Audio(AudioChunk),
}
