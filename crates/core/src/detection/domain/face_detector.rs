use crate::shared::face::FaceBox;
use crate::shared::frame::Frame;

/// Finds faces in a frame. Implementations are shared between the video
/// stage and the consent loader, so they must be callable from multiple
/// threads.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>>;
}
