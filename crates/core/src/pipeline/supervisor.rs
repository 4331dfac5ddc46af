use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::anonymize::infrastructure::anonymizer_factory::create_anonymizer;
use crate::audio::domain::segmenter::SpeechSegmenter;
use crate::audio::domain::speech_recognizer::SpeechRecognizer;
use crate::audio::domain::speech_segment::{AudioChunk, SpeechSegment};
use crate::consent::domain::phrase::ConsentPhraseDetector;
use crate::consent::domain::record::ConsentRecord;
use crate::consent::domain::store::ConsentStore;
use crate::consent::infrastructure::record_file::{load_record, remove_sidecar};
use crate::consent::infrastructure::watcher::{existing_captures, ConsentEvent, ConsentWatcher};
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::pipeline::capture::capture_channel;
use crate::pipeline::health::StageHealth;
use crate::pipeline::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::monitor::{self, QueueProbe};
use crate::pipeline::queue::{BoundedQueue, OverflowPolicy};
use crate::pipeline::shutdown::{PipelineState, ShutdownToken, StateCell};
use crate::pipeline::stages;
use crate::pipeline::stages::transcribe::ConsentGranter;
use crate::pipeline::stages::video::VideoStage;
use crate::shared::config::RelayConfig;
use crate::shared::constants::AUDIO_SAMPLE_RATE;
use crate::shared::frame::Frame;
use crate::stream::domain::stream_sink::StreamSink;
use crate::stream::domain::stream_source::StreamSource;

/// How long an egress push blocks before dropping, keeping audio and video
/// roughly in step when the sink stalls.
const EGRESS_BLOCK: Duration = Duration::from_secs(1);

/// Consent watch poll interval; also bounds watch-thread shutdown latency.
const WATCH_POLL: Duration = Duration::from_millis(200);

/// The pluggable parts of the relay. Everything behind a trait so the
/// pipeline runs against stubs in tests and real media/inference in the
/// binary.
pub struct PipelineComponents {
    pub source: Box<dyn StreamSource>,
    pub sink: Box<dyn StreamSink>,
    pub detector: Arc<dyn FaceDetector>,
    pub embedder: Arc<dyn FaceEmbedder>,
    /// One recognizer per transcription worker; each owns its own model
    /// state.
    pub recognizers: Vec<Box<dyn SpeechRecognizer>>,
    pub phrases: Arc<dyn ConsentPhraseDetector>,
}

/// Runs the whole relay until `shutdown` fires, then drains every stage in
/// dependency order and returns the final metrics.
///
/// Stage wiring: input feeds the video queue and the audio fan-out; audio
/// fans out to the VAD (when transcription is on) and to the egress; the
/// VAD feeds speech segments to the transcription workers; video and audio
/// meet again at the output stage. Consent records flow in from the watch
/// thread and from the workers, out through the copy-on-write store.
pub fn run(
    config: RelayConfig,
    components: PipelineComponents,
    shutdown: ShutdownToken,
) -> Result<MetricsSnapshot, Box<dyn std::error::Error>> {
    let state = StateCell::new();
    let metrics = Arc::new(PipelineMetrics::new());
    let health = Arc::new(StageHealth::new());
    let store = Arc::new(ConsentStore::new());

    // Records already on disk apply before the first frame is matched.
    preload_consents(&config.consent_dir, &store, &components.embedder)?;
    let watcher = ConsentWatcher::new(&config.consent_dir)?;

    let transcription_on = config.enable_transcription && !components.recognizers.is_empty();

    let video_in: BoundedQueue<Frame> =
        BoundedQueue::new("video_in", config.queues.video_in, OverflowPolicy::DropOldest);
    let audio_in: BoundedQueue<AudioChunk> =
        BoundedQueue::new("audio_in", config.queues.audio_in, OverflowPolicy::DropOldest);
    let video_out: BoundedQueue<Frame> = BoundedQueue::new(
        "video_out",
        config.queues.video_out,
        OverflowPolicy::Block(EGRESS_BLOCK),
    );
    let audio_out: BoundedQueue<AudioChunk> = BoundedQueue::new(
        "audio_out",
        config.queues.audio_out,
        OverflowPolicy::Block(EGRESS_BLOCK),
    );
    let vad_in: Option<BoundedQueue<AudioChunk>> = transcription_on.then(|| {
        BoundedQueue::new("vad_in", config.queues.vad_in, OverflowPolicy::DropOldest)
    });
    let speech: Option<BoundedQueue<SpeechSegment>> = transcription_on.then(|| {
        BoundedQueue::new("speech", config.queues.speech, OverflowPolicy::DropOldest)
    });

    let (capture_client, capture_rx) =
        capture_channel(Duration::from_millis(config.capture_timeout_ms));
    let (info_tx, info_rx) = crossbeam_channel::bounded(4);

    let mut probes = vec![
        QueueProbe::of(&video_in, stages::video::STAGE_NAME),
        QueueProbe::of(&audio_in, stages::audio::STAGE_NAME),
        QueueProbe::of(&video_out, stages::output::STAGE_NAME),
        QueueProbe::of(&audio_out, stages::output::STAGE_NAME),
    ];
    if let Some(q) = &vad_in {
        probes.push(QueueProbe::of(q, stages::vad::STAGE_NAME));
    }
    if let Some(q) = &speech {
        probes.push(QueueProbe::of(q, stages::transcribe::STAGE_NAME));
    }

    let input = {
        let (video_in, audio_in) = (video_in.clone(), audio_in.clone());
        let (shutdown, health, metrics) = (shutdown.clone(), health.clone(), metrics.clone());
        let source = components.source;
        std::thread::Builder::new()
            .name("input".to_string())
            .spawn(move || {
                stages::input::run(source, video_in, audio_in, info_tx, shutdown, health, metrics)
            })?
    };

    let video = {
        let stage = VideoStage {
            detector: components.detector,
            embedder: Arc::clone(&components.embedder),
            anonymizer: create_anonymizer(config.anonymize_mode, config.blur_strength),
            store: Arc::clone(&store),
            capture_rx,
            metrics: Arc::clone(&metrics),
            match_threshold: config.match_threshold,
            min_face_px: config.min_face_px,
        };
        let (video_in, video_out, health) = (video_in.clone(), video_out.clone(), health.clone());
        std::thread::Builder::new()
            .name("video".to_string())
            .spawn(move || stages::video::run(stage, video_in, video_out, health))?
    };

    let audio = {
        let (audio_in, audio_out) = (audio_in.clone(), audio_out.clone());
        let vad_in = vad_in.clone();
        let (metrics, health) = (metrics.clone(), health.clone());
        std::thread::Builder::new()
            .name("audio".to_string())
            .spawn(move || stages::audio::run(audio_in, audio_out, vad_in, metrics, health))?
    };

    let vad = match (&vad_in, &speech) {
        (Some(vad_in), Some(speech)) => {
            let segmenter = SpeechSegmenter::new(&config.vad, AUDIO_SAMPLE_RATE);
            let (vad_in, speech) = (vad_in.clone(), speech.clone());
            let (metrics, health) = (metrics.clone(), health.clone());
            Some(
                std::thread::Builder::new()
                    .name("vad".to_string())
                    .spawn(move || stages::vad::run(segmenter, vad_in, speech, metrics, health))?,
            )
        }
        _ => None,
    };

    let mut workers = Vec::new();
    if let Some(speech) = &speech {
        health.register(stages::transcribe::STAGE_NAME);
        for (index, recognizer) in components.recognizers.into_iter().enumerate() {
            let granter = ConsentGranter {
                phrases: Arc::clone(&components.phrases),
                capture: capture_client.clone(),
                embedder: Arc::clone(&components.embedder),
                store: Arc::clone(&store),
                consent_dir: config.consent_dir.clone(),
                metrics: Arc::clone(&metrics),
            };
            let (speech, health) = (speech.clone(), health.clone());
            workers.push(
                std::thread::Builder::new()
                    .name(format!("transcribe-{index}"))
                    .spawn(move || stages::transcribe::run(recognizer, granter, speech, health))?,
            );
        }
    }

    let output = {
        let (video_out, audio_out, health) =
            (video_out.clone(), audio_out.clone(), health.clone());
        let sink = components.sink;
        std::thread::Builder::new()
            .name("output".to_string())
            .spawn(move || stages::output::run(sink, info_rx, video_out, audio_out, health))?
    };

    let watch = {
        let (store, embedder, shutdown) =
            (Arc::clone(&store), Arc::clone(&components.embedder), shutdown.clone());
        std::thread::Builder::new()
            .name("consent-watch".to_string())
            .spawn(move || watch_consents(watcher, store, embedder, shutdown))?
    };

    let monitor = {
        let (health, metrics, shutdown) = (health.clone(), metrics.clone(), shutdown.clone());
        let interval = Duration::from_millis(config.monitor_interval_ms);
        let timeout = Duration::from_millis(config.health_timeout_ms);
        std::thread::Builder::new()
            .name("monitor".to_string())
            .spawn(move || monitor::run(health, metrics, probes, interval, timeout, shutdown))?
    };

    state.set(PipelineState::Running);
    log::info!(
        "Relay running: {} -> {} ({} consent records loaded, transcription {})",
        config.ingress_url,
        config.egress_url,
        store.len(),
        if transcription_on { "on" } else { "off" }
    );

    // The input stage exits only on shutdown; everything downstream drains
    // behind it via queue closure.
    join_stage(input, "input");
    state.set(PipelineState::Draining);
    join_stage(video, "video");
    join_stage(audio, "audio");
    if let Some(vad) = vad {
        join_stage(vad, "vad");
    }
    for worker in workers {
        join_stage(worker, "transcribe");
    }
    join_stage(output, "output");
    join_stage(watch, "consent-watch");
    join_stage(monitor, "monitor");
    state.set(PipelineState::Stopped);

    metrics.log_summary();
    Ok(metrics.snapshot())
}

fn join_stage(handle: std::thread::JoinHandle<()>, name: &str) {
    if handle.join().is_err() {
        log::error!("Stage {name} panicked");
    }
}

/// Loads the consent records already present in the directory, oldest
/// first. Every capture file becomes its own record; a person with two
/// captures stays consented until both are deleted.
fn preload_consents(
    dir: &Path,
    store: &ConsentStore,
    embedder: &Arc<dyn FaceEmbedder>,
) -> Result<(), std::io::Error> {
    for path in existing_captures(dir)? {
        insert_from_file(&path, store, embedder);
    }
    log::info!("Preloaded {} consent records from {}", store.len(), dir.display());
    Ok(())
}

/// Applies grants and revocations observed in the consent directory for
/// the life of the pipeline. Deleting a capture file revokes on the next
/// frame; its sidecar is cleaned up alongside.
fn watch_consents(
    watcher: ConsentWatcher,
    store: Arc<ConsentStore>,
    embedder: Arc<dyn FaceEmbedder>,
    shutdown: ShutdownToken,
) {
    while !shutdown.is_triggered() {
        match watcher.poll(WATCH_POLL) {
            Some(ConsentEvent::Added(path)) => insert_from_file(&path, &store, &embedder),
            Some(ConsentEvent::Removed(path)) => {
                store.remove_by_source(&path);
                remove_sidecar(&path);
            }
            None => {}
        }
    }
    log::info!("Consent watch stopped");
}

/// Reads one capture file into the store. A capture without a sidecar
/// (dropped in by hand) is re-embedded from the image.
fn insert_from_file(path: &Path, store: &ConsentStore, embedder: &Arc<dyn FaceEmbedder>) {
    let loaded = match load_record(path) {
        Ok(loaded) => loaded,
        Err(err) => {
            log::warn!("Skipping unreadable consent capture {}: {err}", path.display());
            return;
        }
    };
    let embedding = match (loaded.embedding, loaded.image) {
        (Some(embedding), _) => embedding,
        (None, Some(image)) => match embedder.embed(&image) {
            Ok(embedding) => embedding,
            Err(err) => {
                log::warn!("Could not embed consent capture {}: {err}", path.display());
                return;
            }
        },
        (None, None) => return,
    };
    store.insert(ConsentRecord {
        name: loaded.name,
        embedding,
        granted_at: loaded.granted_at,
        source: path.to_path_buf(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::infrastructure::pattern_phrase_detector::PatternPhraseDetector;
    use crate::consent::infrastructure::record_file::save_record;
    use crate::shared::config::AnonymizeMode;
    use crate::shared::face::FaceBox;
    use crate::stream::domain::media::{MediaEvent, StreamInfo};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct StubSource {
        frames: Mutex<Vec<Frame>>,
        shutdown: ShutdownToken,
    }

    impl StreamSource for StubSource {
        fn connect(&mut self) -> Result<StreamInfo, Box<dyn std::error::Error>> {
            Ok(StreamInfo {
                width: 64,
                height: 64,
                fps: 30.0,
                video_codec: "raw".to_string(),
                has_audio: false,
            })
        }

        fn read(&mut self) -> Result<Option<MediaEvent>, Box<dyn std::error::Error>> {
            if let Some(frame) = self.frames.lock().unwrap().pop() {
                // Pace the stream so the video stage keeps up.
                std::thread::sleep(Duration::from_millis(2));
                return Ok(Some(MediaEvent::Video(frame)));
            }
            while !self.shutdown.is_triggered() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(None)
        }

        fn close(&mut self) {}
    }

    #[derive(Default)]
    struct StubSink {
        sequences: Arc<Mutex<Vec<u64>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl StreamSink for StubSink {
        fn open(&mut self, _info: &StreamInfo) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
        fn write_video(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            self.sequences.lock().unwrap().push(frame.sequence());
            Ok(())
        }
        fn write_audio(&mut self, _chunk: &AudioChunk) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    struct OneFaceDetector;
    impl FaceDetector for OneFaceDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
            Ok(vec![FaceBox {
                x: 16,
                y: 16,
                width: 32,
                height: 32,
                confidence: 0.9,
            }])
        }
    }

    struct FixedEmbedder(Vec<f32>);
    impl FaceEmbedder for FixedEmbedder {
        fn embed(&self, _face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
            Ok(self.0.clone())
        }
    }

    fn frames(count: u64) -> Vec<Frame> {
        // Reversed because the stub pops from the back.
        (0..count)
            .rev()
            .map(|seq| {
                Frame::new(vec![180u8; 64 * 64 * 3], 64, 64, 3)
                    .with_timing(seq as f64 / 30.0, seq)
            })
            .collect()
    }

    #[test]
    fn test_video_only_relay_end_to_end() {
        let consent_dir = tempfile::tempdir().unwrap();
        // Alice consented before this run started.
        save_record(
            consent_dir.path(),
            "alice",
            NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            &Frame::new(vec![128u8; 16 * 16 * 3], 16, 16, 3),
            &[1.0, 0.0],
        )
        .unwrap();

        let config = RelayConfig {
            consent_dir: consent_dir.path().to_path_buf(),
            anonymize_mode: AnonymizeMode::SolidMask,
            enable_transcription: false,
            min_face_px: 16,
            monitor_interval_ms: 50,
            ..RelayConfig::default()
        };

        let shutdown = ShutdownToken::new();
        let sink = StubSink::default();
        let sequences = sink.sequences.clone();
        let closed = sink.closed.clone();

        let components = PipelineComponents {
            source: Box::new(StubSource {
                frames: Mutex::new(frames(6)),
                shutdown: shutdown.clone(),
            }),
            sink: Box::new(sink),
            detector: Arc::new(OneFaceDetector),
            // Matches the preloaded record exactly.
            embedder: Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            recognizers: Vec::new(),
            phrases: Arc::new(PatternPhraseDetector::new()),
        };

        let runner = {
            let shutdown = shutdown.clone();
            std::thread::spawn(move || {
                run(config, components, shutdown).map_err(|e| e.to_string())
            })
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while sequences.lock().unwrap().len() < 6 {
            assert!(std::time::Instant::now() < deadline, "frames never reached the sink");
            std::thread::sleep(Duration::from_millis(10));
        }
        shutdown.trigger();
        let snapshot = runner.join().unwrap().unwrap();

        let sequences = sequences.lock().unwrap();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]), "order preserved");
        assert!(*closed.lock().unwrap(), "sink closed on drain");
        assert!(snapshot.frames_processed >= 6);
        // Every face matched the preloaded record.
        assert_eq!(snapshot.faces_labeled, snapshot.faces_detected);
        assert_eq!(snapshot.faces_anonymized, 0);
    }

    #[test]
    fn test_unknown_faces_are_anonymized_end_to_end() {
        let consent_dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            consent_dir: consent_dir.path().to_path_buf(),
            anonymize_mode: AnonymizeMode::SolidMask,
            enable_transcription: false,
            min_face_px: 16,
            monitor_interval_ms: 50,
            ..RelayConfig::default()
        };

        let shutdown = ShutdownToken::new();
        let sink = StubSink::default();
        let sequences = sink.sequences.clone();

        let components = PipelineComponents {
            source: Box::new(StubSource {
                frames: Mutex::new(frames(3)),
                shutdown: shutdown.clone(),
            }),
            sink: Box::new(sink),
            detector: Arc::new(OneFaceDetector),
            embedder: Arc::new(FixedEmbedder(vec![0.0, 1.0])),
            recognizers: Vec::new(),
            phrases: Arc::new(PatternPhraseDetector::new()),
        };

        let runner = {
            let shutdown = shutdown.clone();
            std::thread::spawn(move || {
                run(config, components, shutdown).map_err(|e| e.to_string())
            })
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while sequences.lock().unwrap().len() < 3 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(10));
        }
        shutdown.trigger();
        let snapshot = runner.join().unwrap().unwrap();
        assert_eq!(snapshot.faces_anonymized, snapshot.faces_detected);
        assert_eq!(snapshot.faces_labeled, 0);
        assert_eq!(snapshot.consents_granted, 0);
    }
}
