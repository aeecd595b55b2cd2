//! Interaction volume counters.

use std::ops::RangeInclusive;

use super::timeline::{CallProvider, Channel, Timeline, TimelineItem};
use crate::model::CallDuration;
use crate::record::CommunicationStats;

/// Call durations that count as a real conversation: two minutes to two and a half hours.
pub const SIGNIFICANT_CALL_SECS: RangeInclusive<i64> = 120..=9_000;

fn significant(item: &TimelineItem) -> Option<u64> {
    match item.duration {
        Some(CallDuration::Seconds(secs)) if SIGNIFICANT_CALL_SECS.contains(&secs) => {
            u64::try_from(secs).ok()
        }
        _ => None,
    }
}

fn count(items: &[TimelineItem]) -> u64 {
    u64::try_from(items.len()).unwrap_or(u64::MAX)
}

/// Counts calls, chats and emails of a bucketed timeline.
///
/// Calls are counted for the named telephony providers only.
#[must_use]
pub fn communication_stats(timeline: &Timeline<'_>) -> CommunicationStats {
    let mut stats = CommunicationStats::default();
    for provider in CallProvider::ALL {
        for call in timeline.incoming(provider) {
            stats.incoming_call_attempt += 1;
            if let Some(secs) = significant(call) {
                stats.incoming_call_duration += secs;
            }
        }
        for call in timeline.outgoing(provider) {
            stats.outgoing_call_attempt += 1;
            if let Some(secs) = significant(call) {
                stats.outgoing_call_quantity += 1;
                stats.outgoing_call_duration += secs;
            }
        }
    }
    stats.incoming_chat_quantity = count(timeline.channel(Channel::IncomingChat));
    stats.outgoing_chat_quantity = count(timeline.channel(Channel::OutgoingChat));
    stats.incoming_email_quantity = count(timeline.channel(Channel::IncomingEmail));
    stats.outgoing_email_quantity = count(timeline.channel(Channel::OutgoingEmail));
    stats
}
