use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::shared::face::FaceBox;
use crate::shared::frame::Frame;

/// The largest face in the frame the video stage was holding when it
/// serviced the request, cropped with head padding from the clean
/// (pre-anonymization) pixels.
#[derive(Clone, Debug)]
pub struct HeadCapture {
    pub image: Frame,
    pub bbox: FaceBox,
    pub timestamp: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The video stage is gone or its request buffer is full.
    #[error("video stage unavailable for capture")]
    Unavailable,
    /// No reply within the configured bound. Never retried silently.
    #[error("capture request timed out after {0:?}")]
    Timeout(Duration),
    /// The frame was processed but held no detectable face.
    #[error("no face in the current frame")]
    NoFace,
}

/// One point-in-time query. This deliberately bypasses the frame queues:
/// the requester wants "the current frame", not a queued one.
pub struct CaptureRequest {
    reply: Sender<Option<HeadCapture>>,
}

impl CaptureRequest {
    pub fn respond(self, capture: Option<HeadCapture>) {
        // Requester may have timed out and dropped the receiver; fine.
        let _ = self.reply.send(capture);
    }
}

/// Requester half, held by transcription workers.
#[derive(Clone)]
pub struct CaptureClient {
    tx: Sender<CaptureRequest>,
    timeout: Duration,
}

impl CaptureClient {
    /// Asks the video stage for the largest face in its current frame and
    /// waits up to the configured timeout.
    pub fn request(&self) -> Result<HeadCapture, CaptureError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .try_send(CaptureRequest { reply: reply_tx })
            .map_err(|_| CaptureError::Unavailable)?;

        match reply_rx.recv_timeout(self.timeout) {
            Ok(Some(capture)) => Ok(capture),
            Ok(None) => Err(CaptureError::NoFace),
            Err(_) => Err(CaptureError::Timeout(self.timeout)),
        }
    }
}

/// Builds the request channel. The receiver goes to the video stage,
/// which polls it once per frame; pending requests are capped so a
/// stalled video stage cannot accumulate work.
pub fn capture_channel(timeout: Duration) -> (CaptureClient, Receiver<CaptureRequest>) {
    let (tx, rx) = bounded(4);
    (CaptureClient { tx, timeout }, rx)
}
