use crate::audio::domain::speech_segment::AudioChunk;
use crate::shared::constants::AUDIO_SAMPLE_RATE;
use crate::shared::frame::Frame;
use crate::stream::domain::media::StreamInfo;
use crate::stream::domain::stream_sink::StreamSink;

/// Encodes and muxes the outgoing stream via ffmpeg-next: MPEG4 video
/// plus mono AAC audio.
///
/// `rtsp://` URLs publish over RTSP; anything else is treated as a file
/// path, which is what the tests use.
pub struct FfmpegSink {
    url: String,
    octx: Option<ffmpeg_next::format::context::Output>,
    video_encoder: Option<ffmpeg_next::codec::encoder::video::Encoder>,
    audio_encoder: Option<ffmpeg_next::codec::encoder::audio::Encoder>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    width: u32,
    height: u32,
    fps: i32,
    video_stream_index: usize,
    audio_stream_index: usize,
    video_pts: i64,
    audio_pts: i64,
    audio_time_base: ffmpeg_next::Rational,
    audio_frame_size: usize,
    sample_buffer: Vec<f32>,
}

// Safety: FfmpegSink is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSink {}

impl FfmpegSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            octx: None,
            video_encoder: None,
            audio_encoder: None,
            scaler: None,
            width: 0,
            height: 0,
            fps: 30,
            video_stream_index: 0,
            audio_stream_index: 0,
            video_pts: 0,
            audio_pts: 0,
            audio_time_base: ffmpeg_next::Rational(1, AUDIO_SAMPLE_RATE as i32),
            audio_frame_size: 1024,
            sample_buffer: Vec::new(),
        }
    }

    fn encode_audio_frame(&mut self, samples: &[f32]) -> Result<(), Box<dyn std::error::Error>> {
        let encoder = self.audio_encoder.as_mut().ok_or("FfmpegSink: no audio")?;
        let octx = self.octx.as_mut().ok_or("FfmpegSink: not opened")?;

        let mut frame = ffmpeg_next::util::frame::audio::Audio::new(
            ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Planar),
            samples.len(),
            ffmpeg_next::ChannelLayout::MONO,
        );
        frame.set_rate(AUDIO_SAMPLE_RATE);
        frame.set_pts(Some(self.audio_pts));

        let dst = frame.data_mut(0);
        let src_bytes = unsafe {
            std::slice::from_raw_parts(samples.as_ptr() as *const u8, samples.len() * 4)
        };
        dst[..src_bytes.len()].copy_from_slice(src_bytes);

        encoder.send_frame(&frame)?;
        self.audio_pts += samples.len() as i64;

        drain_packets(encoder, octx, self.audio_stream_index, self.audio_time_base)
    }
}

impl StreamSink for FfmpegSink {
    fn open(&mut self, info: &StreamInfo) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        self.width = info.width;
        self.height = info.height;
        self.fps = {
            let fps = info.fps.round() as i32;
            if fps <= 0 {
                30
            } else {
                fps
            }
        };

        let mut octx = if self.url.starts_with("rtsp://") {
            ffmpeg_next::format::output_as(&self.url, "rtsp")?
        } else {
            ffmpeg_next::format::output(&self.url)?
        };

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        // Video: MPEG4, widely compatible.
        let video_codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or("MPEG4 encoder not found")?;
        let mut ost_video = octx.add_stream(Some(video_codec))?;
        self.video_stream_index = ost_video.index();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(video_codec)
            .encoder()
            .video()?;
        encoder_ctx.set_width(info.width);
        encoder_ctx.set_height(info.height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, self.fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(self.fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let video_encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new())?;
        ost_video.set_parameters(&video_encoder);

        // Audio: mono AAC at the pipeline rate.
        if info.has_audio {
            let aac = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::AAC)
                .ok_or("AAC encoder not found")?;
            let mut ost_audio = octx.add_stream(Some(aac))?;
            self.audio_stream_index = ost_audio.index();

            let mut audio_ctx = ffmpeg_next::codec::context::Context::new_with_codec(aac)
                .encoder()
                .audio()?;
            audio_ctx.set_rate(AUDIO_SAMPLE_RATE as i32);
            audio_ctx.set_channel_layout(ffmpeg_next::ChannelLayout::MONO);
            audio_ctx.set_format(ffmpeg_next::format::Sample::F32(
                ffmpeg_next::format::sample::Type::Planar,
            ));
            if global_header {
                audio_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
            }
            let audio_encoder = audio_ctx.open_as(aac)?;
            ost_audio.set_parameters(&audio_encoder);

            let frame_size = audio_encoder.frame_size() as usize;
            self.audio_frame_size = if frame_size == 0 { 1024 } else { frame_size };
            self.audio_time_base = audio_encoder.time_base();
            self.audio_encoder = Some(audio_encoder);
        }

        octx.write_header()?;

        self.scaler = Some(ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            info.width,
            info.height,
            ffmpeg_next::format::Pixel::YUV420P,
            info.width,
            info.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?);
        self.octx = Some(octx);
        self.video_pts = 0;
        self.audio_pts = 0;
        self.sample_buffer.clear();

        log::info!("Egress opened: {}", self.url);
        Ok(())
    }

    fn write_video(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let encoder = self.video_encoder.as_mut().ok_or("FfmpegSink: not opened")?;
        let scaler = self.scaler.as_mut().ok_or("FfmpegSink: not opened")?;
        let octx = self.octx.as_mut().ok_or("FfmpegSink: not opened")?;

        let mut rgb = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.width,
            self.height,
        );
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        let src = frame.data();
        let row_bytes = self.width as usize * 3;
        for row in 0..self.height as usize {
            let dst_start = row * stride;
            let src_start = row * row_bytes;
            data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src[src_start..src_start + row_bytes]);
        }

        let mut yuv = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&rgb, &mut yuv)?;
        yuv.set_pts(Some(self.video_pts));
        self.video_pts += 1;

        encoder.send_frame(&yuv)?;
        drain_packets(
            encoder,
            octx,
            self.video_stream_index,
            ffmpeg_next::Rational(1, self.fps),
        )
    }

    fn write_audio(&mut self, chunk: &AudioChunk) -> Result<(), Box<dyn std::error::Error>> {
        if self.audio_encoder.is_none() {
            return Ok(());
        }
        self.sample_buffer.extend_from_slice(&chunk.samples);
        while self.sample_buffer.len() >= self.audio_frame_size {
            let frame: Vec<f32> = self.sample_buffer.drain(..self.audio_frame_size).collect();
            self.encode_audio_frame(&frame)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.octx.is_none() {
            return Ok(());
        }

        // Trailing partial audio frame, then flush both encoders.
        if !self.sample_buffer.is_empty() && self.audio_encoder.is_some() {
            let rest = std::mem::take(&mut self.sample_buffer);
            self.encode_audio_frame(&rest)?;
        }

        let octx = self.octx.as_mut().ok_or("FfmpegSink: not opened")?;
        if let Some(encoder) = self.video_encoder.as_mut() {
            encoder.send_eof()?;
            drain_packets(
                encoder,
                octx,
                self.video_stream_index,
                ffmpeg_next::Rational(1, self.fps),
            )?;
        }
        if let Some(encoder) = self.audio_encoder.as_mut() {
            encoder.send_eof()?;
            drain_packets(encoder, octx, self.audio_stream_index, self.audio_time_base)?;
        }
        octx.write_trailer()?;

        self.octx = None;
        self.video_encoder = None;
        self.audio_encoder = None;
        self.scaler = None;
        log::info!("Egress closed: {}", self.url);
        Ok(())
    }
}

fn drain_packets<E: EncoderPackets>(
    encoder: &mut E,
    octx: &mut ffmpeg_next::format::context::Output,
    stream_index: usize,
    enc_time_base: ffmpeg_next::Rational,
) -> Result<(), Box<dyn std::error::Error>> {
    let ost_time_base = octx
        .stream(stream_index)
        .ok_or("FfmpegSink: missing output stream")?
        .time_base();
    let mut encoded = ffmpeg_next::Packet::empty();
    while encoder.receive_packet(&mut encoded).is_ok() {
        encoded.set_stream(stream_index);
        encoded.rescale_ts(enc_time_base, ost_time_base);
        encoded.write_interleaved(octx)?;
    }
    Ok(())
}

/// Video and audio encoders expose `receive_packet` separately; this lets
/// one drain routine serve both.
trait EncoderPackets {
    fn receive_packet(&mut self, packet: &mut ffmpeg_next::Packet)
        -> Result<(), ffmpeg_next::Error>;
}

impl EncoderPackets for ffmpeg_next::codec::encoder::video::Encoder {
    fn receive_packet(
        &mut self,
        packet: &mut ffmpeg_next::Packet,
    ) -> Result<(), ffmpeg_next::Error> {
        ffmpeg_next::codec::encoder::video::Encoder::receive_packet(self, packet)
    }
}

impl EncoderPackets for ffmpeg_next::codec::encoder::audio::Encoder {
    fn receive_packet(
        &mut self,
        packet: &mut ffmpeg_next::Packet,
    ) -> Result<(), ffmpeg_next::Error> {
        ffmpeg_next::codec::encoder::audio::Encoder::receive_packet(self, packet)
    }
}
