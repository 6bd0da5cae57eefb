pub mod config;
pub mod drivers;
pub mod engine;
pub mod recorder;
pub mod types;

pub use config::MonitorConfig;
pub use drivers::{Monitor, MonitorError, SourceError};
