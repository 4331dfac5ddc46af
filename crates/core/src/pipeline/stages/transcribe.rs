use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::domain::speech_recognizer::SpeechRecognizer;
use crate::audio::domain::speech_segment::SpeechSegment;
use crate::consent::domain::phrase::ConsentPhraseDetector;
use crate::consent::domain::record::{sanitize_name, ConsentRecord};
use crate::consent::domain::store::ConsentStore;
use crate::consent::infrastructure::record_file::save_record;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::pipeline::capture::CaptureClient;
use crate::pipeline::health::StageHealth;
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::queue::BoundedQueue;

pub const STAGE_NAME: &str = "transcribe";

const POP_WAIT: Duration = Duration::from_millis(500);

/// Turns a consent phrase heard in a transcript into a durable grant:
/// head capture from the video stage, embedding, capture file on disk,
/// record in the store.
///
/// Every detection produces exactly one record or none. A failed capture
/// is logged and counted but never retried; the speaker simply repeats the
/// phrase.
pub struct ConsentGranter {
    pub phrases: Arc<dyn ConsentPhraseDetector>,
    pub capture: CaptureClient,
    pub embedder: Arc<dyn FaceEmbedder>,
    pub store: Arc<ConsentStore>,
    pub consent_dir: PathBuf,
    pub metrics: Arc<PipelineMetrics>,
}

impl ConsentGranter {
    /// Returns the granted name when the transcript contained a consent
    /// phrase and the whole grant path succeeded.
    pub fn process_transcript(&self, transcript: &str) -> Option<String> {
        let detection = self.phrases.detect(transcript)?;
        log::info!(
            "Consent phrase heard: \"{}\" (confidence {:.1})",
            detection.matched,
            detection.confidence
        );

        let capture = match self.capture.request() {
            Ok(capture) => capture,
            Err(err) => {
                self.metrics.capture_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Head capture failed, consent not granted: {err}");
                return None;
            }
        };

        let embedding = match self.embedder.embed(&capture.image) {
            Ok(embedding) => embedding,
            Err(err) => {
                self.metrics.capture_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Could not embed head capture: {err}");
                return None;
            }
        };

        let name = sanitize_name(detection.name.as_deref().unwrap_or(""));
        let granted_at = chrono::Local::now().naive_local();
        let source = match save_record(&self.consent_dir, &name, granted_at, &capture.image, &embedding)
        {
            Ok(path) => path,
            Err(err) => {
                log::error!("Could not persist consent capture: {err}");
                return None;
            }
        };

        self.store.insert(ConsentRecord {
            name: name.clone(),
            embedding,
            granted_at,
            source,
        });
        self.metrics.consents_granted.fetch_add(1, Ordering::Relaxed);
        Some(name)
    }
}

/// Worker loop: pop a speech segment, transcribe it, and run the grant
/// path on the transcript. Several workers may share the speech queue.
pub fn run(
    recognizer: Box<dyn SpeechRecognizer>,
    granter: ConsentGranter,
    speech: BoundedQueue<SpeechSegment>,
    health: Arc<StageHealth>,
) {
    loop {
        health.heartbeat(STAGE_NAME);
        match speech.pop_timeout(POP_WAIT) {
            Ok(Some(segment)) => {
                let transcript = match recognizer.transcribe(&segment) {
                    Ok(text) => text,
                    Err(err) => {
                        log::warn!("Transcription failed: {err}");
                        continue;
                    }
                };
                granter
                    .metrics
                    .transcriptions
                    .fetch_add(1, Ordering::Relaxed);
                if transcript.is_empty() {
                    continue;
                }
                log::debug!("Transcript at {:.2}s: {transcript}", segment.start_time);
                granter.process_transcript(&transcript);
            }
            Ok(None) => {}
            Err(_) => break,
        }
    }
    log::info!("Transcription worker stopped");
}
