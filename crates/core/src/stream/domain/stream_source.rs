use crate::stream::domain::media::{MediaEvent, StreamInfo};

/// Ingress side of the relay: a connected media stream yielding decoded
/// video frames and audio chunks.
///
/// `read` returns `Ok(None)` on a clean end of stream; transport errors
/// surface as `Err` and the input stage decides whether to reconnect.
pub trait StreamSource: Send {
    fn connect(&mut self) -> Result<StreamInfo, Box<dyn std::error::Error>>;
    fn read(&mut self) -> Result<Option<MediaEvent>, Box<dyn std::error::Error>>;
    fn close(&mut self);
}
