use std::cell::RefCell;

use crate::anonymize::domain::face_anonymizer::FaceAnonymizer;
use crate::anonymize::infrastructure::gaussian;
use crate::shared::face::FaceBox;
use crate::shared::frame::Frame;

/// Gaussian face blur with a separable kernel.
///
/// Large kernels go through a downscale-blur-upscale path; the result is
/// visually identical at a fraction of the cost, which matters at stream
/// frame rates.
pub struct GaussianBlurAnonymizer {
    kernel: Vec<f32>,
    scale: usize,
    small_kernel: Vec<f32>,
    roi_buf: RefCell<Vec<u8>>,
    blur_temp: RefCell<Vec<f32>>,
}

impl GaussianBlurAnonymizer {
    /// `kernel_size` is forced odd; the blur must be strong enough that
    /// the face is unrecognizable, so small values are for tests only.
    pub fn new(kernel_size: usize) -> Self {
        let kernel_size = kernel_size | 1;
        let scale = (kernel_size / 50).max(1);
        let small_k = (kernel_size / scale) | 1;
        Self {
            kernel: gaussian::gaussian_kernel_1d(kernel_size),
            scale,
            small_kernel: gaussian::gaussian_kernel_1d(small_k),
            roi_buf: RefCell::new(Vec::new()),
            blur_temp: RefCell::new(Vec::new()),
        }
    }
}

impl FaceAnonymizer for GaussianBlurAnonymizer {
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

            // Copy the ROI out, blur it, write it back.
            let mut roi = self.roi_buf.borrow_mut();
            roi.resize(rw * rh * channels, 0);
            for row in 0..rh {
                let src = ((ry + row) * fw + rx) * channels;
                let dst = row * rw * channels;
                roi[dst..dst + rw * channels].copy_from_slice(&data[src..src + rw * channels]);
            }

            let mut temp = self.blur_temp.borrow_mut();
            if self.scale <= 1 || rh < self.scale * 2 || rw < self.scale * 2 {
                gaussian::blur_with_kernel(&mut roi, rw, rh, channels, &self.kernel, &mut temp);
            } else {
                let (mut small, sw, sh) = gaussian::downscale(&roi, rw, rh, channels, self.scale);
                gaussian::blur_with_kernel(
                    &mut small,
                    sw,
                    sh,
                    channels,
                    &self.small_kernel,
                    &mut temp,
                );
                let upscaled = gaussian::upscale(&small, sw, sh, channels, rw, rh);
                let len = roi.len();
                roi[..len].copy_from_slice(&upscaled);
            }

            for row in 0..rh {
                let dst = ((ry + row) * fw + rx) * channels;
                let src = row * rw * channels;
                data[dst..dst + rw * channels].copy_from_slice(&roi[src..src + rw * channels]);
            }
        }

        Ok(())
    }
}
