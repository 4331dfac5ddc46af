pub mod capture;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod queue;
pub mod shutdown;
pub mod stages;
pub mod supervisor;
