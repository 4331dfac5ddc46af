use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use consentgate_core::audio::domain::speech_recognizer::SpeechRecognizer;
use consentgate_core::audio::infrastructure::whisper_transcriber::WhisperTranscriber;
use consentgate_core::consent::infrastructure::pattern_phrase_detector::PatternPhraseDetector;
use consentgate_core::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use consentgate_core::detection::infrastructure::onnx_face_embedder::OnnxFaceEmbedder;
use consentgate_core::pipeline::shutdown::ShutdownToken;
use consentgate_core::pipeline::supervisor::{self, PipelineComponents};
use consentgate_core::shared::config::{AnonymizeMode, RelayConfig};
use consentgate_core::shared::constants::{
    DETECTOR_MODEL_NAME, DETECTOR_MODEL_URL, EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL,
    WHISPER_MODEL_NAME, WHISPER_MODEL_URL,
};
use consentgate_core::shared::model_resolver;
use consentgate_core::stream::infrastructure::ffmpeg_sink::FfmpegSink;
use consentgate_core::stream::infrastructure::ffmpeg_source::FfmpegSource;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Gaussian blur over unconsented faces
    Blur,
    /// Solid ellipse over unconsented faces
    Mask,
}

impl From<Mode> for AnonymizeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Blur => AnonymizeMode::Blur,
            Mode::Mask => AnonymizeMode::SolidMask,
        }
    }
}

/// Privacy-preserving video relay: anonymizes every face on the ingress
/// stream unless its owner granted consent, spoken on-stream or dropped as
/// a capture file into the consent directory.
#[derive(Debug, Parser)]
#[command(name = "consentgate", version, about)]
struct Cli {
    /// JSON config file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// RTMP URL the relay listens on for the publisher
    #[arg(long, value_name = "URL")]
    ingress: Option<String>,

    /// RTSP URL the filtered stream is pushed to
    #[arg(long, value_name = "URL")]
    egress: Option<String>,

    /// Directory of durable consent capture files
    #[arg(long, value_name = "DIR")]
    consent_dir: Option<PathBuf>,

    /// How unconsented faces are obscured
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Gaussian kernel size for blur mode (odd)
    #[arg(long)]
    blur_strength: Option<usize>,

    /// Embedding distance at or below which a face matches a record
    #[arg(long)]
    match_threshold: Option<f32>,

    /// Face detector confidence floor
    #[arg(long)]
    confidence: Option<f32>,

    /// Number of transcription workers
    #[arg(long)]
    workers: Option<usize>,

    /// Run as a video-only relay, without speech consent detection
    #[arg(long)]
    no_transcription: bool,

    /// Directory of pre-downloaded model files
    #[arg(long, value_name = "DIR")]
    models_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&cli)?;

    let models_dir = cli.models_dir.as_deref();
    let detector_path = model_resolver::resolve(DETECTOR_MODEL_NAME, DETECTOR_MODEL_URL, models_dir)?;
    let embedder_path =
        model_resolver::resolve(EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, models_dir)?;

    let mut recognizers: Vec<Box<dyn SpeechRecognizer>> = Vec::new();
    if config.enable_transcription {
        let whisper_path =
            model_resolver::resolve(WHISPER_MODEL_NAME, WHISPER_MODEL_URL, models_dir)?;
        for _ in 0..config.transcription_workers {
            recognizers.push(Box::new(WhisperTranscriber::new(&whisper_path)?));
        }
    }

    let components = PipelineComponents {
        source: Box::new(FfmpegSource::new(config.ingress_url.clone())),
        sink: Box::new(FfmpegSink::new(config.egress_url.clone())),
        detector: Arc::new(OnnxFaceDetector::new(&detector_path, config.detect_confidence)?),
        embedder: Arc::new(OnnxFaceEmbedder::new(&embedder_path)?),
        recognizers,
        phrases: Arc::new(PatternPhraseDetector::new()),
    };

    let shutdown = ShutdownToken::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger())?;
    }

    supervisor::run(config, components, shutdown)?;
    Ok(())
}

fn build_config(cli: &Cli) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let mut config: RelayConfig = match &cli.config {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None => RelayConfig::default(),
    };

    if let Some(ingress) = &cli.ingress {
        config.ingress_url = ingress.clone();
    }
    if let Some(egress) = &cli.egress {
        config.egress_url = egress.clone();
    }
    if let Some(dir) = &cli.consent_dir {
        config.consent_dir = dir.clone();
    }
    if let Some(mode) = cli.mode {
        config.anonymize_mode = mode.into();
    }
    if let Some(strength) = cli.blur_strength {
        config.blur_strength = strength;
    }
    if let Some(threshold) = cli.match_threshold {
        config.match_threshold = threshold;
    }
    if let Some(confidence) = cli.confidence {
        config.detect_confidence = confidence;
    }
    if let Some(workers) = cli.workers {
        config.transcription_workers = workers;
    }
    if cli.no_transcription {
        config.enable_transcription = false;
    }

    if config.blur_strength < 3 {
        return Err("blur strength must be at least 3".into());
    }
    if !(0.0..=2.0).contains(&config.match_threshold) {
        return Err("match threshold must be between 0 and 2".into());
    }
    if config.enable_transcription && config.transcription_workers == 0 {
        return Err("at least one transcription worker is required".into());
    }
    Ok(config)
}
