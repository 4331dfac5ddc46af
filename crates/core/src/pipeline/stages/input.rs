use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::pipeline::health::StageHealth;
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::queue::BoundedQueue;
use crate::pipeline::shutdown::ShutdownToken;
use crate::shared::frame::Frame;
use crate::stream::domain::media::{MediaEvent, StreamInfo};
use crate::stream::domain::stream_source::StreamSource;
use crate::audio::domain::speech_segment::AudioChunk;

pub const STAGE_NAME: &str = "input";

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Ingress stage: owns the stream source, demuxes media events onto the
/// video and audio queues, and reconnects when the publisher drops.
///
/// A publisher hanging up is normal operation, not an error; the stage
/// clears the real-time queues (stale frames would only add latency) and
/// listens again with exponential backoff capped at 5 seconds. On each
/// successful connect the stream parameters are sent to the output stage.
pub fn run(
    mut source: Box<dyn StreamSource>,
    video_in: BoundedQueue<Frame>,
    audio_in: BoundedQueue<AudioChunk>,
    info_tx: Sender<StreamInfo>,
    shutdown: ShutdownToken,
    health: Arc<StageHealth>,
    metrics: Arc<PipelineMetrics>,
) {
    health.register(STAGE_NAME);
    let mut backoff = INITIAL_BACKOFF;
    let mut connected_before = false;

    'reconnect: while !shutdown.is_triggered() {
        health.heartbeat(STAGE_NAME);
        let info = match source.connect() {
            Ok(info) => info,
            Err(err) => {
                log::warn!("Ingress connect failed: {err}");
                sleep_interruptible(backoff, &shutdown);
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };
        backoff = INITIAL_BACKOFF;
        if connected_before {
            metrics.input_reconnects.fetch_add(1, Ordering::Relaxed);
        }
        connected_before = true;
        // Output may already be open with the first publisher's params.
        let _ = info_tx.try_send(info);

        loop {
            if shutdown.is_triggered() {
                break 'reconnect;
            }
            health.heartbeat(STAGE_NAME);
            match source.read() {
                Ok(Some(MediaEvent::Video(frame))) => {
                    if video_in.push(frame).dropped() {
                        metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(Some(MediaEvent::Audio(chunk))) => {
                    audio_in.push(chunk);
                }
                Ok(None) => {
                    log::info!("Publisher disconnected, waiting for the next one");
                    break;
                }
                Err(err) => {
                    log::warn!("Ingress read error: {err}");
                    break;
                }
            }
        }

        source.close();
        video_in.clear();
        audio_in.clear();
        sleep_interruptible(backoff, &shutdown);
    }

    source.close();
    video_in.close();
    audio_in.close();
    health.mark_stopped(STAGE_NAME);
    log::info!("Input stage stopped");
}

fn sleep_interruptible(duration: Duration, shutdown: &ShutdownToken) {
    let tick = Duration::from_millis(50);
    let mut remaining = duration;
    while remaining > Duration::ZERO && !shutdown.is_triggered() {
        let step = remaining.min(tick);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
