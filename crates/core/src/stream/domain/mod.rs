pub mod media;
pub mod stream_sink;
pub mod stream_source;
