use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::anonymize::domain::face_anonymizer::FaceAnonymizer;
use crate::anonymize::infrastructure::label::label_face;
use crate::consent::domain::store::{best_match, ConsentSnapshot, ConsentStore};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::pipeline::capture::{CaptureRequest, HeadCapture};
use crate::pipeline::health::StageHealth;
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::queue::BoundedQueue;
use crate::shared::constants::HEAD_CAPTURE_PADDING;
use crate::shared::face::{DetectedFace, FaceBox, FaceDecision};
use crate::shared::frame::Frame;

pub const STAGE_NAME: &str = "video";

const POP_WAIT: Duration = Duration::from_millis(500);

/// The per-frame face path: detect, match against the consent snapshot,
/// then conceal or label.
///
/// Head-capture requests from the transcription workers are serviced here,
/// from the clean pixels of the frame in hand, before any concealment
/// touches it. One consent snapshot is taken per frame so every face on a
/// frame is judged against the same consent set.
pub struct VideoStage {
    pub detector: Arc<dyn FaceDetector>,
    pub embedder: Arc<dyn FaceEmbedder>,
    pub anonymizer: Box<dyn FaceAnonymizer>,
    pub store: Arc<ConsentStore>,
    pub capture_rx: Receiver<CaptureRequest>,
    pub metrics: Arc<PipelineMetrics>,
    pub match_threshold: f32,
    pub min_face_px: i32,
}

impl VideoStage {
    /// Processes one frame. Detection failure forwards the frame
    /// unmodified; concealment failure falls back to blacking out the
    /// region so an unconsented face never leaves visible.
    pub fn process(&self, mut frame: Frame) -> Frame {
        let boxes = match self.detector.detect(&frame) {
            Ok(boxes) => boxes,
            Err(err) => {
                self.metrics.detect_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Detection failed on frame {}: {err}", frame.sequence());
                self.answer_captures(&frame, &[]);
                self.metrics.record_frame(0);
                return frame;
            }
        };

        let snapshot = self.store.snapshot();
        let faces: Vec<DetectedFace> = boxes
            .into_iter()
            .map(|bbox| self.classify(&frame, bbox, &snapshot))
            .collect();

        self.answer_captures(&frame, &faces);

        let conceal: Vec<FaceBox> = faces
            .iter()
            .filter(|f| f.decision == FaceDecision::Anonymize)
            .map(|f| f.bbox.clone())
            .collect();
        if let Err(err) = self.anonymizer.conceal(&mut frame, &conceal) {
            log::error!("Concealment failed, blacking out regions: {err}");
            for bbox in &conceal {
                black_out(&mut frame, bbox);
            }
        }
        self.metrics
            .faces_anonymized
            .fetch_add(conceal.len() as u64, Ordering::Relaxed);

        let label_scale = (frame.width() as usize / 640).max(1);
        for face in &faces {
            if let FaceDecision::Label(name) = &face.decision {
                label_face(&mut frame, &face.bbox, name, label_scale);
                self.metrics.faces_labeled.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.metrics.record_frame(faces.len());
        frame.faces = faces;
        frame
    }

    /// Faces too small to embed reliably are concealed outright; the rest
    /// get matched against the snapshot, lowest distance below the
    /// threshold winning.
    fn classify(&self, frame: &Frame, bbox: FaceBox, snapshot: &ConsentSnapshot) -> DetectedFace {
        if bbox.width.min(bbox.height) < self.min_face_px {
            return DetectedFace::unmatched(bbox);
        }
        let Some(crop) = frame.crop(bbox.x, bbox.y, bbox.width, bbox.height) else {
            return DetectedFace::unmatched(bbox);
        };
        let embedding = match self.embedder.embed(&crop) {
            Ok(embedding) => embedding,
            Err(err) => {
                log::debug!("Embedding failed, concealing face: {err}");
                return DetectedFace::unmatched(bbox);
            }
        };

        let decision = best_match(snapshot, &embedding, self.match_threshold);
        DetectedFace {
            bbox,
            identity: decision.map(|(name, _)| name.to_string()),
            decision: match decision {
                Some((name, distance)) => {
                    log::trace!("Face matched {name} at distance {distance:.3}");
                    FaceDecision::Label(name.to_string())
                }
                None => FaceDecision::Anonymize,
            },
            embedding: Some(embedding),
        }
    }

    /// Answers every pending head-capture request with the largest face in
    /// the current frame, cropped with padding from the clean pixels.
    fn answer_captures(&self, frame: &Frame, faces: &[DetectedFace]) {
        while let Ok(request) = self.capture_rx.try_recv() {
            let capture = faces
                .iter()
                .max_by_key(|f| f.bbox.area())
                .and_then(|face| {
                    let padded = face.bbox.padded(HEAD_CAPTURE_PADDING);
                    frame
                        .crop(padded.x, padded.y, padded.width, padded.height)
                        .map(|image| HeadCapture {
                            image,
                            bbox: face.bbox.clone(),
                            timestamp: frame.timestamp(),
                        })
                });
            request.respond(capture);
        }
    }
}

pub fn run(
    stage: VideoStage,
    video_in: BoundedQueue<Frame>,
    video_out: BoundedQueue<Frame>,
    health: Arc<StageHealth>,
) {
    health.register(STAGE_NAME);
    loop {
        health.heartbeat(STAGE_NAME);
        match video_in.pop_timeout(POP_WAIT) {
            Ok(Some(frame)) => {
                let processed = stage.process(frame);
                if video_out.push(processed).dropped() {
                    stage.metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(None) => {}
            Err(_) => break,
        }
    }
    video_out.close();
    health.mark_stopped(STAGE_NAME);
    log::info!("Video stage stopped");
}

fn black_out(frame: &mut Frame, bbox: &FaceBox) {
    let Some((x, y, w, h)) = bbox.clamped(frame.width(), frame.height()) else {
        return;
    };
    let fw = frame.width() as usize;
    let channels = frame.channels() as usize;
    let data = frame.data_mut();
    for row in y..y + h {
        let start = (row * fw + x) * channels;
        data[start..start + w * channels].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymize::infrastructure::mask_anonymizer::SolidMaskAnonymizer;
    use crate::consent::domain::record::ConsentRecord;
    use crate::pipeline::capture::capture_channel;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    struct FixedDetector(Vec<FaceBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            Err("inference backend gone".into())
        }
    }

    struct FixedEmbedder(Vec<f32>);

    impl FaceEmbedder for FixedEmbedder {
        fn embed(&self, _face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    fn face_box(x: i32, y: i32, side: i32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: side,
            height: side,
            confidence: 0.9,
        }
    }

    fn test_frame() -> Frame {
        Frame::new(vec![200u8; 64 * 64 * 3], 64, 64, 3).with_timing(1.0, 3)
    }

    fn consented(name: &str, embedding: Vec<f32>) -> ConsentRecord {
        ConsentRecord {
            name: name.to_string(),
            embedding,
            granted_at: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            source: PathBuf::from(format!("/tmp/20250101000000_{name}.jpg")),
        }
    }

    fn stage(
        detector: impl FaceDetector + 'static,
        embedder: impl FaceEmbedder + 'static,
        store: Arc<ConsentStore>,
    ) -> (VideoStage, crate::pipeline::capture::CaptureClient) {
        let (client, capture_rx) = capture_channel(Duration::from_millis(200));
        (
            VideoStage {
                detector: Arc::new(detector),
                embedder: Arc::new(embedder),
                anonymizer: Box::new(SolidMaskAnonymizer::default()),
                store,
                capture_rx,
                metrics: Arc::new(PipelineMetrics::new()),
                match_threshold: 0.4,
                min_face_px: 16,
            },
            client,
        )
    }

    #[test]
    fn test_unconsented_face_is_concealed() {
        let store = Arc::new(ConsentStore::new());
        let (stage, _client) = stage(
            FixedDetector(vec![face_box(10, 10, 30)]),
            FixedEmbedder(vec![1.0, 0.0]),
            store,
        );
        let frame = stage.process(test_frame());
        assert_eq!(frame.faces.len(), 1);
        assert_eq!(frame.faces[0].decision, FaceDecision::Anonymize);
        // Center of the face region is no longer the original gray.
        let idx = (25 * 64 + 25) * 3;
        assert_ne!(frame.data()[idx], 200);
        assert_eq!(stage.metrics.snapshot().faces_anonymized, 1);
    }

    #[test]
    fn test_consented_face_is_labeled_not_concealed() {
        let store = Arc::new(ConsentStore::new());
        store.insert(consented("alice", vec![1.0, 0.0]));
        let (stage, _client) = stage(
            FixedDetector(vec![face_box(10, 10, 30)]),
            FixedEmbedder(vec![1.0, 0.0]),
            store,
        );
        let frame = stage.process(test_frame());
        assert_eq!(
            frame.faces[0].decision,
            FaceDecision::Label("alice".to_string())
        );
        // Interior pixels keep their original value.
        let idx = (25 * 64 + 25) * 3;
        assert_eq!(frame.data()[idx], 200);
        assert_eq!(stage.metrics.snapshot().faces_labeled, 1);
    }

    #[test]
    fn test_tiny_face_skips_matching() {
        let store = Arc::new(ConsentStore::new());
        store.insert(consented("alice", vec![1.0, 0.0]));
        let (stage, _client) = stage(
            FixedDetector(vec![face_box(10, 10, 8)]),
            FixedEmbedder(vec![1.0, 0.0]),
            store,
        );
        let frame = stage.process(test_frame());
        assert_eq!(frame.faces[0].decision, FaceDecision::Anonymize);
        assert!(frame.faces[0].embedding.is_none());
    }

    #[test]
    fn test_detect_failure_forwards_frame_unmodified() {
        let store = Arc::new(ConsentStore::new());
        let (stage, _client) = stage(FailingDetector, FixedEmbedder(vec![1.0, 0.0]), store);
        let original = test_frame();
        let frame = stage.process(original.clone());
        assert_eq!(frame.data(), original.data());
        assert!(frame.faces.is_empty());
        assert_eq!(stage.metrics.snapshot().detect_failures, 1);
    }

    #[test]
    fn test_capture_request_serviced_from_clean_pixels() {
        let store = Arc::new(ConsentStore::new());
        let (stage, client) = stage(
            FixedDetector(vec![face_box(16, 16, 32)]),
            FixedEmbedder(vec![1.0, 0.0]),
            store,
        );
        let requester = std::thread::spawn(move || client.request());
        // Give the request time to land in the channel.
        std::thread::sleep(Duration::from_millis(50));
        stage.process(test_frame());

        let capture = requester.join().unwrap().unwrap();
        assert_eq!(capture.bbox.width, 32);
        assert!((capture.timestamp - 1.0).abs() < 1e-9);
        // Clean pixels, not the concealed ones.
        assert!(capture.image.data().iter().any(|&v| v == 200));
    }

    #[test]
    fn test_capture_request_with_no_face_gets_no_face() {
        let store = Arc::new(ConsentStore::new());
        let (stage, client) = stage(
            FixedDetector(vec![]),
            FixedEmbedder(vec![1.0, 0.0]),
            store,
        );
        let requester = std::thread::spawn(move || client.request());
        std::thread::sleep(Duration::from_millis(50));
        stage.process(test_frame());
        assert!(matches!(
            requester.join().unwrap(),
            Err(crate::pipeline::capture::CaptureError::NoFace)
        ));
    }

    #[test]
    fn test_largest_face_wins_capture() {
        let store = Arc::new(ConsentStore::new());
        let (stage, client) = stage(
            FixedDetector(vec![face_box(0, 0, 16), face_box(24, 24, 36)]),
            FixedEmbedder(vec![1.0, 0.0]),
            store,
        );
        let requester = std::thread::spawn(move || client.request());
        std::thread::sleep(Duration::from_millis(50));
        stage.process(test_frame());
        assert_eq!(requester.join().unwrap().unwrap().bbox.width, 36);
    }

    #[test]
    fn test_run_drains_and_closes_output() {
        let store = Arc::new(ConsentStore::new());
        let (stage, _client) = stage(
            FixedDetector(vec![]),
            FixedEmbedder(vec![1.0, 0.0]),
            store,
        );
        let video_in = BoundedQueue::new(
            "video_in",
            8,
            crate::pipeline::queue::OverflowPolicy::DropOldest,
        );
        let video_out = BoundedQueue::new(
            "video_out",
            8,
            crate::pipeline::queue::OverflowPolicy::DropOldest,
        );
        let health = Arc::new(StageHealth::new());

        video_in.push(test_frame());
        video_in.push(test_frame().with_timing(2.0, 4));
        video_in.close();

        run(stage, video_in, video_out.clone(), health);
        assert_eq!(video_out.pop().unwrap().sequence(), 3);
        assert_eq!(video_out.pop().unwrap().sequence(), 4);
        assert!(video_out.is_closed());
    }
}
