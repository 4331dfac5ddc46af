use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::audio::domain::speech_segment::AudioChunk;
use crate::pipeline::health::StageHealth;
use crate::pipeline::queue::BoundedQueue;
use crate::shared::frame::Frame;
use crate::stream::domain::media::StreamInfo;
use crate::stream::domain::stream_sink::StreamSink;

pub const STAGE_NAME: &str = "output";

const POP_WAIT: Duration = Duration::from_millis(10);
const INFO_WAIT: Duration = Duration::from_millis(500);

/// Egress stage: opens the sink once the ingress has reported its stream
/// parameters, then drains the video and audio egress queues until both
/// are closed and empty. Nothing is written after close.
pub fn run(
    mut sink: Box<dyn StreamSink>,
    info_rx: Receiver<StreamInfo>,
    video_out: BoundedQueue<Frame>,
    audio_out: BoundedQueue<AudioChunk>,
    health: Arc<StageHealth>,
) {
    health.register(STAGE_NAME);

    let Some(info) = wait_for_info(&info_rx, &video_out, &audio_out, &health) else {
        // Pipeline shut down before any publisher arrived.
        health.mark_stopped(STAGE_NAME);
        log::info!("Output stage stopped before a stream started");
        return;
    };

    if let Err(err) = sink.open(&info) {
        log::error!("Egress open failed, discarding output: {err}");
        discard(&video_out, &audio_out, &health);
        health.mark_stopped(STAGE_NAME);
        return;
    }

    let mut video_open = true;
    let mut audio_open = true;
    let mut write_errors: u64 = 0;
    while video_open || audio_open {
        health.heartbeat(STAGE_NAME);
        if video_open {
            match video_out.pop_timeout(POP_WAIT) {
                Ok(Some(frame)) => {
                    if let Err(err) = sink.write_video(&frame) {
                        note_write_error(&mut write_errors, "video", err.as_ref());
                    }
                }
                Ok(None) => {}
                Err(_) => video_open = false,
            }
        }
        if audio_open {
            match audio_out.pop_timeout(POP_WAIT) {
                Ok(Some(chunk)) => {
                    if let Err(err) = sink.write_audio(&chunk) {
                        note_write_error(&mut write_errors, "audio", err.as_ref());
                    }
                }
                Ok(None) => {}
                Err(_) => audio_open = false,
            }
        }
    }

    if let Err(err) = sink.close() {
        log::warn!("Egress close failed: {err}");
    }
    health.mark_stopped(STAGE_NAME);
    log::info!("Output stage stopped");
}

/// Blocks until the first `StreamInfo` arrives. Returns `None` when both
/// egress queues close first, which means the pipeline is draining without
/// ever having connected.
fn wait_for_info(
    info_rx: &Receiver<StreamInfo>,
    video_out: &BoundedQueue<Frame>,
    audio_out: &BoundedQueue<AudioChunk>,
    health: &StageHealth,
) -> Option<StreamInfo> {
    loop {
        health.heartbeat(STAGE_NAME);
        match info_rx.recv_timeout(INFO_WAIT) {
            Ok(info) => return Some(info),
            Err(RecvTimeoutError::Timeout) => {
                let video_done = video_out.is_closed() && video_out.is_empty();
                let audio_done = audio_out.is_closed() && audio_out.is_empty();
                if video_done && audio_done {
                    return None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

fn discard(video_out: &BoundedQueue<Frame>, audio_out: &BoundedQueue<AudioChunk>, health: &StageHealth) {
    let mut video_open = true;
    let mut audio_open = true;
    while video_open || audio_open {
        health.heartbeat(STAGE_NAME);
        if video_open && video_out.pop_timeout(POP_WAIT).is_err() {
            video_open = false;
        }
        if audio_open && audio_out.pop_timeout(POP_WAIT).is_err() {
            audio_open = false;
        }
    }
}

fn note_write_error(count: &mut u64, kind: &str, err: &dyn std::error::Error) {
    *count += 1;
    if *count == 1 || *count % 100 == 0 {
        log::warn!("Egress {kind} write failed ({count} errors so far): {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::OverflowPolicy;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        opened: bool,
        closed: bool,
        frames: Arc<Mutex<Vec<u64>>>,
        samples: Arc<Mutex<usize>>,
    }

    impl StreamSink for RecordingSink {
        fn open(&mut self, _info: &StreamInfo) -> Result<(), Box<dyn std::error::Error>> {
            self.opened = true;
            Ok(())
        }

        fn write_video(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            assert!(self.opened && !self.closed, "write outside open/close");
            self.frames.lock().unwrap().push(frame.sequence());
            Ok(())
        }

        fn write_audio(&mut self, chunk: &AudioChunk) -> Result<(), Box<dyn std::error::Error>> {
            assert!(self.opened && !self.closed, "write outside open/close");
            *self.samples.lock().unwrap() += chunk.samples.len();
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.closed = true;
            Ok(())
        }
    }

    fn info() -> StreamInfo {
        StreamInfo {
            width: 4,
            height: 4,
            fps: 30.0,
            video_codec: "raw".to_string(),
            has_audio: true,
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3).with_timing(seq as f64, seq)
    }

    #[test]
    fn test_drains_both_queues_in_order_then_closes() {
        let video_out = BoundedQueue::new("video_out", 8, OverflowPolicy::DropOldest);
        let audio_out = BoundedQueue::new("audio_out", 8, OverflowPolicy::DropOldest);
        let sink = RecordingSink::default();
        let frames = sink.frames.clone();
        let samples = sink.samples.clone();

        for seq in 0..3 {
            video_out.push(frame(seq));
        }
        audio_out.push(AudioChunk::new(vec![0.0; 160], 0.0));
        video_out.close();
        audio_out.close();

        let (info_tx, info_rx) = crossbeam_channel::bounded(1);
        info_tx.send(info()).unwrap();

        run(
            Box::new(sink),
            info_rx,
            video_out,
            audio_out,
            Arc::new(StageHealth::new()),
        );

        assert_eq!(*frames.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(*samples.lock().unwrap(), 160);
    }

    #[test]
    fn test_exits_cleanly_when_no_stream_ever_starts() {
        let video_out: BoundedQueue<Frame> =
            BoundedQueue::new("video_out", 8, OverflowPolicy::DropOldest);
        let audio_out: BoundedQueue<AudioChunk> =
            BoundedQueue::new("audio_out", 8, OverflowPolicy::DropOldest);
        video_out.close();
        audio_out.close();

        let (_info_tx, info_rx) = crossbeam_channel::bounded::<StreamInfo>(1);
        run(
            Box::new(RecordingSink::default()),
            info_rx,
            video_out,
            audio_out,
            Arc::new(StageHealth::new()),
        );
    }

    #[test]
    fn test_open_failure_discards_queue_contents() {
        struct BrokenSink;
        impl StreamSink for BrokenSink {
            fn open(&mut self, _info: &StreamInfo) -> Result<(), Box<dyn std::error::Error>> {
                Err("egress unreachable".into())
            }
            fn write_video(&mut self, _: &Frame) -> Result<(), Box<dyn std::error::Error>> {
                panic!("must not write after a failed open");
            }
            fn write_audio(&mut self, _: &AudioChunk) -> Result<(), Box<dyn std::error::Error>> {
                panic!("must not write after a failed open");
            }
            fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
                Ok(())
            }
        }

        let video_out = BoundedQueue::new("video_out", 8, OverflowPolicy::DropOldest);
        let audio_out: BoundedQueue<AudioChunk> =
            BoundedQueue::new("audio_out", 8, OverflowPolicy::DropOldest);
        video_out.push(frame(0));
        video_out.close();
        audio_out.close();

        let (info_tx, info_rx) = crossbeam_channel::bounded(1);
        info_tx.send(info()).unwrap();
        run(
            Box::new(BrokenSink),
            info_rx,
            video_out.clone(),
            audio_out,
            Arc::new(StageHealth::new()),
        );
        assert!(video_out.is_empty());
    }
}
