pub const DETECTOR_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const DETECTOR_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

pub const WHISPER_MODEL_NAME: &str = "ggml-tiny.en.bin";
pub const WHISPER_MODEL_URL: &str =
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.en.bin";

/// The whole audio path runs at this rate: VAD chunking, whisper input,
/// and the egress AAC encode.
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;

/// Consent capture images are written as JPEG at this quality.
pub const CAPTURE_JPEG_QUALITY: u8 = 95;

/// Extra padding around a detected face when saving a head capture, as a
/// fraction of the smaller box side.
pub const HEAD_CAPTURE_PADDING: f64 = 0.3;
