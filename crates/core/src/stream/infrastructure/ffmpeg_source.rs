use std::collections::VecDeque;

use crate::audio::domain::speech_segment::AudioChunk;
use crate::shared::constants::AUDIO_SAMPLE_RATE;
use crate::shared::frame::Frame;
use crate::stream::domain::media::{MediaEvent, StreamInfo};
use crate::stream::domain::stream_source::StreamSource;

/// Demuxes and decodes an incoming stream via ffmpeg-next (libavformat +
/// libavcodec).
///
/// Video is converted to tightly packed RGB24; audio is resampled to the
/// pipeline format (16 kHz mono f32) so the VAD and the egress encoder
/// share one representation. For `rtmp://` URLs the source listens for a
/// publisher instead of dialing out.
pub struct FfmpegSource {
    url: String,
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video: Option<VideoDecodePath>,
    audio: Option<AudioDecodePath>,
    pending: VecDeque<MediaEvent>,
    frame_seq: u64,
    flushed: bool,
}

struct VideoDecodePath {
    stream_index: usize,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    time_base: f64,
}

struct AudioDecodePath {
    stream_index: usize,
    decoder: ffmpeg_next::decoder::Audio,
    resampler: ffmpeg_next::software::resampling::Context,
    time_base: f64,
}

// Safety: FfmpegSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            input_ctx: None,
            video: None,
            audio: None,
            pending: VecDeque::new(),
            frame_seq: 0,
            flushed: false,
        }
    }

    fn decode_video_packet(
        &mut self,
        packet: Option<&ffmpeg_next::Packet>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(video) = self.video.as_mut() else {
            return Ok(());
        };
        match packet {
            Some(packet) => video.decoder.send_packet(packet)?,
            None => video.decoder.send_eof()?,
        }

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while video.decoder.receive_frame(&mut decoded).is_ok() {
            let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
            video.scaler.run(&decoded, &mut rgb)?;

            let timestamp = decoded.pts().map_or(0.0, |pts| pts as f64 * video.time_base);
            let frame = Frame::new(
                strip_stride(&rgb, video.width, video.height),
                video.width,
                video.height,
                3,
            )
            .with_timing(timestamp, self.frame_seq);
            self.frame_seq += 1;
            self.pending.push_back(MediaEvent::Video(frame));
        }
        Ok(())
    }

    fn decode_audio_packet(
        &mut self,
        packet: Option<&ffmpeg_next::Packet>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(audio) = self.audio.as_mut() else {
            return Ok(());
        };
        match packet {
            Some(packet) => audio.decoder.send_packet(packet)?,
            None => audio.decoder.send_eof()?,
        }

        let mut decoded = ffmpeg_next::util::frame::audio::Audio::empty();
        let mut resampled = ffmpeg_next::util::frame::audio::Audio::empty();
        while audio.decoder.receive_frame(&mut decoded).is_ok() {
            let timestamp = decoded.pts().map_or(0.0, |pts| pts as f64 * audio.time_base);
            audio.resampler.run(&decoded, &mut resampled)?;
            let samples = extract_f32_samples(&resampled);
            if !samples.is_empty() {
                self.pending
                    .push_back(MediaEvent::Audio(AudioChunk::new(samples, timestamp)));
            }
        }

        if packet.is_none() {
            // Drain whatever the resampler buffered.
            if let Ok(Some(delay)) = audio.resampler.flush(&mut resampled) {
                if delay.output > 0 {
                    let samples = extract_f32_samples(&resampled);
                    if !samples.is_empty() {
                        self.pending
                            .push_back(MediaEvent::Audio(AudioChunk::new(samples, 0.0)));
                    }
                }
            }
        }
        Ok(())
    }
}

impl StreamSource for FfmpegSource {
    fn connect(&mut self) -> Result<StreamInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let mut options = ffmpeg_next::Dictionary::new();
        if self.url.starts_with("rtmp://") {
            // Act as the RTMP ingest endpoint; the publisher dials us.
            options.set("listen", "1");
        }
        let ictx = ffmpeg_next::format::input_with_dictionary(&self.url, options)?;

        let video_stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream in ingress")?;
        let video_index = video_stream.index();
        let video_tb = f64::from(video_stream.time_base());

        let codec_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let (width, height) = (decoder.width(), decoder.height());

        let rate = video_stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let video_codec = decoder
            .codec()
            .map(|c| c.name().to_string())
            .unwrap_or_default();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        self.video = Some(VideoDecodePath {
            stream_index: video_index,
            decoder,
            scaler,
            width,
            height,
            time_base: video_tb,
        });

        let audio = match ictx.streams().best(ffmpeg_next::media::Type::Audio) {
            Some(audio_stream) => {
                let audio_index = audio_stream.index();
                let audio_tb = f64::from(audio_stream.time_base());
                let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(
                    audio_stream.parameters(),
                )?;
                let decoder = codec_ctx.decoder().audio()?;
                let resampler = ffmpeg_next::software::resampling::Context::get(
                    decoder.format(),
                    decoder.channel_layout(),
                    decoder.rate(),
                    ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Planar),
                    ffmpeg_next::ChannelLayout::MONO,
                    AUDIO_SAMPLE_RATE,
                )?;
                Some(AudioDecodePath {
                    stream_index: audio_index,
                    decoder,
                    resampler,
                    time_base: audio_tb,
                })
            }
            None => None,
        };
        let has_audio = audio.is_some();
        self.audio = audio;

        self.input_ctx = Some(ictx);
        self.pending.clear();
        self.frame_seq = 0;
        self.flushed = false;

        log::info!(
            "Ingress connected: {}x{width}x{height} @ {fps:.1} fps, audio={has_audio}",
            self.url
        );

        Ok(StreamInfo {
            width,
            height,
            fps,
            video_codec,
            has_audio,
        })
    }

    fn read(&mut self) -> Result<Option<MediaEvent>, Box<dyn std::error::Error>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.flushed {
                return Ok(None);
            }
            if self.input_ctx.is_none() {
                return Err("FfmpegSource: not connected".into());
            }

            // Borrow the context only for the packet pull; decoding needs
            // &mut self for the pending queue.
            let next = {
                let ictx = self.input_ctx.as_mut().ok_or("FfmpegSource: not connected")?;
                ictx.packets()
                    .next()
                    .map(|(stream, packet)| (stream.index(), packet))
            };

            match next {
                Some((index, packet)) => {
                    if Some(index) == self.video.as_ref().map(|v| v.stream_index) {
                        self.decode_video_packet(Some(&packet))?;
                    } else if Some(index) == self.audio.as_ref().map(|a| a.stream_index) {
                        self.decode_audio_packet(Some(&packet))?;
                    }
                }
                None => {
                    // Publisher hung up: drain both decoders once.
                    self.decode_video_packet(None)?;
                    self.decode_audio_packet(None)?;
                    self.flushed = true;
                }
            }
        }
    }

    fn close(&mut self) {
        self.input_ctx = None;
        self.video = None;
        self.audio = None;
        self.pending.clear();
    }
}

/// ffmpeg rows may carry padding (stride > width*3); pack them tight.
fn strip_stride(rgb: &ffmpeg_next::util::frame::video::Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let w = width as usize;

    let mut pixels = Vec::with_capacity(w * height as usize * 3);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + w * 3]);
    }
    pixels
}

/// Pull f32 samples out of a planar mono frame.
fn extract_f32_samples(frame: &ffmpeg_next::util::frame::audio::Audio) -> Vec<f32> {
    let num_samples = frame.samples();
    if num_samples == 0 {
        return Vec::new();
    }
    let data = frame.data(0);
    let floats = unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, num_samples) };
    floats.to_vec()
}
