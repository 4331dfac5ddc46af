pub mod phrase;
pub mod record;
pub mod store;
