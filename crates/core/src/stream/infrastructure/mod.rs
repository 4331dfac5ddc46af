pub mod ffmpeg_sink;
pub mod ffmpeg_source;
