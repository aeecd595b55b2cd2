//! Structured warning channel for data gaps.
//!
//! Missing dictionary entries, unknown users and malformed provider payloads
//! degrade a lead to partial values. Each occurrence is reported here so the
//! caller can log, count or assert on it.

mod gap;
mod sink;

pub use gap::{DataGap, DataGapKind};
pub use sink::{CollectingSink, CountingSink, DiagnosticSink, LoggingSink, NoOpSink};
