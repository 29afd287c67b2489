pub mod config;
pub mod display;
pub mod error;
pub mod poller;
pub mod telemetry;

// Re-export commonly used items
pub use config::Config;
pub use error::{AppError, Result};
pub use poller::Poller;
pub use telemetry::{ExchangeFailure, FailureKind, Query, Reading, ReadingSet, TelemetryClient};
