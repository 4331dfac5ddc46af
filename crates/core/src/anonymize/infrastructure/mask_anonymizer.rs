use crate::anonymize::domain::face_anonymizer::FaceAnonymizer;
use crate::shared::face::FaceBox;
use crate::shared::frame::Frame;

/// Fills each face with a solid ellipse inscribed in its box. Cheaper than
/// blurring and leaks nothing, at the cost of a harsher look.
pub struct SolidMaskAnonymizer {
    color: [u8; 3],
}

impl SolidMaskAnonymizer {
    pub fn new(color: [u8; 3]) -> Self {
        Self { color }
    }
}

impl Default for SolidMaskAnonymizer {
    fn default() -> Self {
        Self::new([32, 32, 32])
    }
}

impl FaceAnonymizer for SolidMaskAnonymizer {
    fn conceal(
        &self,
        frame: &mut Frame,
        faces: &[FaceBox],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let fw = frame.width() as usize;
        let frame_w = frame.width();
        let frame_h = frame.height();
        let channels = frame.channels() as usize;
        let data = frame.data_mut();

        for face in faces {
            let Some((rx, ry, rw, rh)) = face.clamped(frame_w, frame_h) else {
                continue;
            };

            // Ellipse centered on the visible box.
            let cx = rx as f64 + rw as f64 / 2.0;
            let cy = ry as f64 + rh as f64 / 2.0;
            let ax = (rw as f64 / 2.0).max(1.0);
            let ay = (rh as f64 / 2.0).max(1.0);

            for y in ry..ry + rh {
                let dy = (y as f64 + 0.5 - cy) / ay;
                for x in rx..rx + rw {
                    let dx = (x as f64 + 0.5 - cx) / ax;
                    if dx * dx + dy * dy <= 1.0 {
                        let idx = (y * fw + x) * channels;
                        for c in 0..channels.min(3) {
                            data[idx + c] = self.color[c];
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: i32, y: i32, w: i32, h: i32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_center_is_masked_corners_are_not() {
        let mut frame = Frame::new(vec![255u8; 40 * 40 * 3], 40, 40, 3);
        SolidMaskAnonymizer::new([0, 0, 0])
            .conceal(&mut frame, &[face(10, 10, 20, 20)])
            .unwrap();

        // Ellipse covers the box center but not its corners.
        assert_eq!(frame.data()[(20 * 40 + 20) * 3], 0);
        assert_eq!(frame.data()[(10 * 40 + 10) * 3], 255);
        // Outside the box entirely.
        assert_eq!(frame.data()[0], 255);
    }

    #[test]
    fn test_mask_color_applied_per_channel() {
        let mut frame = Frame::new(vec![255u8; 20 * 20 * 3], 20, 20, 3);
        SolidMaskAnonymizer::new([10, 20, 30])
            .conceal(&mut frame, &[face(0, 0, 20, 20)])
            .unwrap();
        let idx = (10 * 20 + 10) * 3;
        assert_eq!(&frame.data()[idx..idx + 3], &[10, 20, 30]);
    }

    #[test]
    fn test_offscreen_face_is_ignored() {
        let mut frame = Frame::new(vec![128u8; 20 * 20 * 3], 20, 20, 3);
        let original = frame.data().to_vec();
        SolidMaskAnonymizer::default()
            .conceal(&mut frame, &[face(100, 100, 10, 10)])
            .unwrap();
        assert_eq!(frame.data(), &original[..]);
    }
}
