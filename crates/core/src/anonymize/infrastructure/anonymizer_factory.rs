use crate::anonymize::domain::face_anonymizer::FaceAnonymizer;
use crate::shared::config::AnonymizeMode;

use super::blur_anonymizer::GaussianBlurAnonymizer;
use super::mask_anonymizer::SolidMaskAnonymizer;

/// Creates the anonymizer selected in configuration. Logs which one so an
/// operator can confirm what the egress will look like before anyone
/// walks on camera.
pub fn create_anonymizer(mode: AnonymizeMode, blur_strength: usize) -> Box<dyn FaceAnonymizer> {
    match mode {
        AnonymizeMode::Blur => {
            log::info!("Anonymizing with Gaussian blur (kernel_size={blur_strength})");
            Box::new(GaussianBlurAnonymizer::new(blur_strength))
        }
        AnonymizeMode::SolidMask => {
            log::info!("Anonymizing with solid mask");
            Box::new(SolidMaskAnonymizer::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::face::FaceBox;
    use crate::shared::frame::Frame;

    fn face() -> FaceBox {
        FaceBox {
            x: 10,
            y: 10,
            width: 30,
            height: 30,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_blur_mode_modifies_face_pixels() {
        let anonymizer = create_anonymizer(AnonymizeMode::Blur, 5);
        let mut frame = Frame::new(vec![0u8; 50 * 50 * 3], 50, 50, 3);
        let idx = (22 * 50 + 22) * 3;
        frame.data_mut()[idx] = 255;
        anonymizer.conceal(&mut frame, &[face()]).unwrap();
        assert!(frame.data()[idx] < 255);
    }

    #[test]
    fn test_mask_mode_fills_face_center() {
        let anonymizer = create_anonymizer(AnonymizeMode::SolidMask, 0);
        let mut frame = Frame::new(vec![255u8; 50 * 50 * 3], 50, 50, 3);
        anonymizer.conceal(&mut frame, &[face()]).unwrap();
        assert_ne!(frame.data()[(25 * 50 + 25) * 3], 255);
    }
}
