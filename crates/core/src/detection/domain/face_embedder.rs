use crate::shared::frame::Frame;

/// Produces an identity embedding from a face crop. Embeddings from the
/// same implementation are comparable by cosine distance; vectors are
/// L2-normalized.
pub trait FaceEmbedder: Send + Sync {
    fn embed(&self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>>;
}
