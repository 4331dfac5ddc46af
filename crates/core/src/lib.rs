pub mod anonymize;
pub mod audio;
pub mod consent;
pub mod detection;
pub mod pipeline;
pub mod shared;
pub mod stream;
