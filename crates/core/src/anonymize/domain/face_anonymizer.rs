use crate::shared::face::FaceBox;
use crate::shared::frame::Frame;

/// Renders faces unrecognizable in-place.
///
/// Implementations must be irreversible on the pixel level: once a face
/// region has been concealed, the original pixels are gone from the frame.
pub trait FaceAnonymizer: Send {
    fn conceal(
        &self,
        frame: &mut Frame,
        faces: &[FaceBox],
    ) -> Result<(), Box<dyn std::error::Error>>;
}
