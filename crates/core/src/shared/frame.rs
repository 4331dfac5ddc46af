use ndarray::{ArrayView3, ArrayViewMut3};

use crate::shared::face::DetectedFace;

/// A single video frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at the stream boundaries only; every stage in
/// between treats pixel data as opaque. A frame is owned by exactly one
/// stage at a time and moves by value from queue to queue.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    /// Stream timestamp in seconds, from the demuxer's monotonic clock.
    timestamp: f64,
    /// Arrival sequence number; stages never reorder frames.
    sequence: u64,
    /// Faces attached by the video stage; empty before detection.
    pub faces: Vec<DetectedFace>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            timestamp: 0.0,
            sequence: 0,
            faces: Vec::new(),
        }
    }

    pub fn with_timing(mut self, timestamp: f64, sequence: u64) -> Self {
        self.timestamp = timestamp;
        self.sequence = sequence;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies a rectangular region into a new frame. The rectangle is
    /// clamped to the frame bounds; returns `None` when nothing remains.
    pub fn crop(&self, x: i32, y: i32, width: i32, height: i32) -> Option<Frame> {
        let fw = self.width as i64;
        let fh = self.height as i64;
        let x0 = (x as i64).clamp(0, fw);
        let y0 = (y as i64).clamp(0, fh);
        let x1 = (x as i64 + width as i64).clamp(0, fw);
        let y1 = (y as i64 + height as i64).clamp(0, fh);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let cw = (x1 - x0) as usize;
        let ch = (y1 - y0) as usize;
        let c = self.channels as usize;
        let mut out = Vec::with_capacity(cw * ch * c);
        for row in y0 as usize..y1 as usize {
            let start = (row * fw as usize + x0 as usize) * c;
            out.extend_from_slice(&self.data[start..start + cw * c]);
        }

        Some(
            Frame::new(out, cw as u32, ch as u32, self.channels)
                .with_timing(self.timestamp, self.sequence),
        )
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3).with_timing(1.5, 7);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.sequence(), 7);
        assert!((frame.timestamp() - 1.5).abs() < f64::EPSILON);
        assert_eq!(frame.data(), &data[..]);
        assert!(frame.faces.is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let frame = Frame::new(vec![100u8; 12], 2, 2, 3);
        let mut cloned = frame.clone();
        cloned.data_mut()[0] = 0;
        assert_eq!(frame.data()[0], 100);
        assert_eq!(cloned.data()[0], 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::new(vec![0u8; 24], 4, 2, 3);
        assert_eq!(frame.as_ndarray().shape(), &[2, 4, 3]); // (h, w, c)
    }

    #[test]
    fn test_crop_interior() {
        // 4x4 RGB, rows filled with the row index
        let mut data = Vec::new();
        for row in 0u8..4 {
            data.extend(std::iter::repeat(row).take(4 * 3));
        }
        let frame = Frame::new(data, 4, 4, 3);
        let crop = frame.crop(1, 1, 2, 2).unwrap();
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
        assert_eq!(crop.data()[0], 1); // first row of the crop is row 1
        assert_eq!(crop.data()[crop.data().len() - 1], 2);
    }

    #[test]
    fn test_crop_clamps_to_bounds() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3);
        let crop = frame.crop(-2, -2, 4, 4).unwrap();
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
    }

    #[test]
    fn test_crop_outside_returns_none() {
        let frame = Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3);
        assert!(frame.crop(10, 10, 4, 4).is_none());
        assert!(frame.crop(0, 0, 0, 0).is_none());
    }
}
