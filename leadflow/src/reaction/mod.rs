//! Manager reaction-time analysis.

mod analyzer;
mod schedule;
mod source;
mod stats;
mod timeline;

pub use analyzer::{ReactionAnalyzer, ReactionResult, DIRECT_CHANNELS, SECONDARY_CHANNELS};
pub use schedule::{DutySchedule, DutyWindow};
pub use source::{infer_creation_source, SourceHints};
pub use stats::{communication_stats, SIGNIFICANT_CALL_SECS};
pub use timeline::{CallProvider, Channel, Timeline, TimelineItem, CREATION_WINDOW_SECS};
