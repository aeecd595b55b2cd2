//! Logging setup and the batch summary event.

mod logging;
mod summary;

pub use logging::{init_tracing, LogConfig, LogFormat};
pub use summary::{BatchSummary, RunTimer};
