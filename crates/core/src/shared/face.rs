/// Axis-aligned face bounding box in frame pixel coordinates.
///
/// Coordinates may extend past the frame edges (detectors report boxes for
/// partially visible faces); consumers clamp via [`FaceBox::clamped`].
#[derive(Clone, Debug, PartialEq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Returns the visible portion as `(x, y, w, h)` in usize coordinates,
    /// or `None` if the box lies entirely outside the frame.
    pub fn clamped(&self, frame_width: u32, frame_height: u32) -> Option<(usize, usize, usize, usize)> {
        let fw = frame_width as i64;
        let fh = frame_height as i64;
        let x0 = (self.x as i64).clamp(0, fw);
        let y0 = (self.y as i64).clamp(0, fh);
        let x1 = (self.x as i64 + self.width as i64).clamp(0, fw);
        let y1 = (self.y as i64 + self.height as i64).clamp(0, fh);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as usize, y0 as usize, (x1 - x0) as usize, (y1 - y0) as usize))
    }

    /// Expands the box by `ratio` of its smaller side on every edge.
    /// Used for head captures, which want hair and chin included.
    pub fn padded(&self, ratio: f64) -> FaceBox {
        let pad = (self.width.min(self.height) as f64 * ratio) as i32;
        FaceBox {
            x: self.x - pad,
            y: self.y - pad,
            width: self.width + 2 * pad,
            height: self.height + 2 * pad,
            confidence: self.confidence,
        }
    }
}

/// What the video stage decided to do with a detected face.
#[derive(Clone, Debug, PartialEq)]
pub enum FaceDecision {
    /// No consent record matched; the region is destructively obscured.
    Anonymize,
    /// A consent record matched; the face stays visible under this name.
    Label(String),
}

/// A face detected on one frame. Created per frame, discarded with it.
///
/// `identity` is a lookup key into the consent store (a record id), never
/// an owning reference; the record may disappear before the next frame.
#[derive(Clone, Debug)]
pub struct DetectedFace {
    pub bbox: FaceBox,
    pub embedding: Option<Vec<f32>>,
    pub identity: Option<String>,
    pub decision: FaceDecision,
}

impl DetectedFace {
    pub fn unmatched(bbox: FaceBox) -> Self {
        Self {
            bbox,
            embedding: None,
            identity: None,
            decision: FaceDecision::Anonymize,
        }
    }
}
