pub mod pattern_phrase_detector;
pub mod record_file;
pub mod watcher;
