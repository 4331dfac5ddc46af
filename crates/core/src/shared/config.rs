use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How unconsented faces are obscured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymizeMode {
    /// Gaussian blur over the face bounding box.
    Blur,
    /// Solid ellipse fitted to the detected facial region.
    SolidMask,
}

/// Capacities for every queue edge in the pipeline graph.
///
/// The real-time edges (input → video, input → vad) stay single-digit so
/// drop-oldest keeps latency bounded by capacity rather than by downstream
/// speed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct QueueCapacities {
    pub video_in: usize,
    pub audio_in: usize,
    pub vad_in: usize,
    pub speech: usize,
    pub video_out: usize,
    pub audio_out: usize,
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            video_in: 8,
            audio_in: 32,
            vad_in: 16,
            speech: 8,
            video_out: 8,
            audio_out: 32,
        }
    }
}

/// Voice-activity detection tuning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VadConfig {
    /// RMS level above which a chunk counts as speech, in dBFS.
    pub threshold_db: f32,
    /// Speech is held this long after the level drops below threshold.
    pub hangover_ms: u32,
    /// Segments shorter than this are discarded as noise.
    pub min_segment_ms: u32,
    /// A segment is force-closed at this length to bound worker latency.
    pub max_segment_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold_db: -40.0,
            hangover_ms: 500,
            min_segment_ms: 500,
            max_segment_ms: 15_000,
        }
    }
}

/// Everything the relay needs, injected once at startup.
/// No runtime reconfiguration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// RTMP listen URL for the publisher.
    pub ingress_url: String,
    /// RTSP push URL for the egress stream.
    pub egress_url: String,
    /// Directory of durable consent record files.
    pub consent_dir: PathBuf,
    pub anonymize_mode: AnonymizeMode,
    /// Gaussian kernel size for the blur anonymizer (odd).
    pub blur_strength: usize,
    /// Embedding distance at or below which a face matches a record.
    pub match_threshold: f32,
    /// Detector confidence floor.
    pub detect_confidence: f32,
    /// Boxes with a smaller side below this many pixels skip embedding;
    /// they are too small to match reliably and are anonymized outright.
    pub min_face_px: i32,
    /// How long a transcription worker waits for a head capture.
    pub capture_timeout_ms: u64,
    /// Number of transcription workers.
    pub transcription_workers: usize,
    /// Disables the VAD/transcription path entirely (video-only relay).
    pub enable_transcription: bool,
    pub queues: QueueCapacities,
    pub vad: VadConfig,
    /// Health monitor sampling interval.
    pub monitor_interval_ms: u64,
    /// A stage is flagged degraded after this long without a heartbeat.
    pub health_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ingress_url: "rtmp://0.0.0.0:1935/live/stream".to_string(),
            egress_url: "rtsp://127.0.0.1:8554/filtered".to_string(),
            consent_dir: PathBuf::from("consent_captures"),
            anonymize_mode: AnonymizeMode::Blur,
            blur_strength: 99,
            match_threshold: 0.4,
            detect_confidence: 0.5,
            min_face_px: 24,
            capture_timeout_ms: 2_000,
            transcription_workers: 1,
            enable_transcription: true,
            queues: QueueCapacities::default(),
            vad: VadConfig::default(),
            monitor_interval_ms: 10_000,
            health_timeout_ms: 120_000,
        }
    }
}
