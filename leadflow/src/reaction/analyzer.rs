//! Reaction-time analysis of one lead.
//!
//! The analyzer buckets the lead's timeline, infers its creation source,
//! resolves the fastest manager reaction and classifies it against the duty
//! schedule. The fallback order is fixed:
//!
//! 1. the fastest direct channel (outgoing call, email, chat, user note,
//!    completed task);
//! 2. otherwise the earliest "trying to get in touch" or "closed" status
//!    change, compared with the earliest completed task when both exist;
//! 3. a successful inbound call earlier than the chosen reaction only sets
//!    `first_successful_incoming_call`.

use std::collections::BTreeMap;
use tracing::debug;

use super::schedule::DutySchedule;
use super::source::{infer_creation_source, SourceHints};
use super::stats::communication_stats;
use super::timeline::{CallProvider, Channel, Timeline, TimelineItem};
use crate::events::{DataGap, DataGapKind, DiagnosticSink};
use crate::funnel::StatusLabels;
use crate::model::{CallDuration, RawLead, ReferenceData};
use crate::record::{CommunicationStats, LatencyBuckets, OutputRecord, ReactionFields};
use crate::utils::TimeConverter;

/// Channels that count as a manager reaction on their own.
pub const DIRECT_CHANNELS: [Channel; 5] = [
    Channel::OutgoingCall,
    Channel::OutgoingEmail,
    Channel::OutgoingChat,
    Channel::UserNote,
    Channel::CompletedTask,
];

/// Status changes used when no direct reaction exists.
pub const SECONDARY_CHANNELS: [Channel; 2] = [Channel::TryingToGetInTouch, Channel::Closed];

/// Outcome of analysing one lead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionResult {
    /// Creation timestamp latencies are measured from.
    pub created_at: i64,
    /// Inferred origin of the lead.
    pub creation_source: String,
    /// Seconds from creation to the first item of each channel.
    pub latencies: BTreeMap<Channel, i64>,
    /// Winning channel.
    pub fastest: Option<Channel>,
    /// A successful inbound call preceded the winning reaction.
    pub first_successful_incoming_call: bool,
    /// The lead arrived during working hours.
    pub on_duty: bool,
    /// Interaction volumes, when requested.
    pub communication: Option<CommunicationStats>,
}

impl ReactionResult {
    /// Latency of one channel.
    #[must_use]
    pub fn latency(&self, channel: Channel) -> Option<i64> {
        self.latencies.get(&channel).copied()
    }

    /// Latency of the winning channel.
    #[must_use]
    pub fn fastest_latency(&self) -> Option<i64> {
        self.fastest.and_then(|c| self.latency(c))
    }

    /// Renders the write-back columns.
    #[must_use]
    pub fn to_fields(&self) -> ReactionFields {
        let reaction = LatencyBuckets::classify(self.fastest_latency());
        let callback = LatencyBuckets::classify(self.latency(Channel::OutgoingCall));
        let mut fields = ReactionFields {
            creation_source: self.creation_source.clone(),
            reaction_type: self.fastest.map(Channel::as_str).unwrap_or_default().to_string(),
            first_successful_incoming_call: self.first_successful_incoming_call,
            reaction,
            callback,
            ..ReactionFields::default()
        };
        if self.on_duty {
            fields.duty_time = "duty time".to_string();
            fields.reaction_time_on_duty_sec = self.fastest_latency();
            fields.reaction_on_duty = reaction;
            fields.callback_on_duty = callback;
        } else {
            fields.duty_time = "off time".to_string();
            fields.reaction_time_off_duty_sec = self.fastest_latency();
            fields.reaction_off_duty = reaction;
            fields.callback_off_duty = callback;
        }
        fields
    }
}

/// Latency of the first item at or after creation.
fn first_latency(items: &[TimelineItem], created_at: i64) -> Option<i64> {
    items.iter().map(|i| i.at - created_at).find(|l| *l >= 0)
}

fn earliest(latencies: &BTreeMap<Channel, i64>, channels: &[Channel]) -> Option<(Channel, i64)> {
    let mut best: Option<(Channel, i64)> = None;
    for channel in channels {
        if let Some(&latency) = latencies.get(channel) {
            if best.map_or(true, |(_, b)| latency < b) {
                best = Some((*channel, latency));
            }
        }
    }
    best
}

fn resolve_fastest(latencies: &mut BTreeMap<Channel, i64>) -> Option<Channel> {
    if let Some((channel, _)) = earliest(latencies, &DIRECT_CHANNELS) {
        return Some(channel);
    }
    let secondary = earliest(latencies, &SECONDARY_CHANNELS);
    let task = latencies.get(&Channel::CompletedTask).copied();
    match (secondary, task) {
        (Some((channel, latency)), Some(task)) if latency < task => Some(channel),
        (Some(_), Some(task)) => {
            latencies.insert(Channel::CompletedTask, task);
            Some(Channel::CompletedTask)
        }
        (Some((channel, _)), None) => Some(channel),
        (None, Some(_)) => Some(Channel::CompletedTask),
        (None, None) => None,
    }
}

fn first_successful_incoming(timeline: &Timeline<'_>) -> Option<i64> {
    CallProvider::ALL.into_iter().find_map(|provider| {
        timeline.incoming(provider).iter().find_map(|call| match call.duration {
            Some(CallDuration::Seconds(secs)) if secs > 0 => Some(call.at - timeline.created_at),
            _ => None,
        })
    })
}

/// Computes reaction metrics against shared reference data.
#[derive(Debug, Clone, Copy)]
pub struct ReactionAnalyzer<'a> {
    refs: &'a ReferenceData,
    time: &'a TimeConverter,
    labels: &'a StatusLabels,
    schedule: Option<&'a DutySchedule>,
    communication_stats: bool,
}

impl<'a> ReactionAnalyzer<'a> {
    /// Creates an analyzer without a duty schedule.
    #[must_use]
    pub const fn new(refs: &'a ReferenceData, time: &'a TimeConverter, labels: &'a StatusLabels) -> Self {
        Self {
            refs,
            time,
            labels,
            schedule: None,
            communication_stats: false,
        }
    }

    /// Classifies creation instants against `schedule`.
    #[must_use]
    pub const fn with_schedule(mut self, schedule: &'a DutySchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Also counts calls, chats and emails.
    #[must_use]
    pub const fn with_communication_stats(mut self, enabled: bool) -> Self {
        self.communication_stats = enabled;
        self
    }

    /// Analyses one lead. Missing data degrades to empty results.
    #[must_use]
    pub fn analyze(&self, lead: &RawLead, sink: &dyn DiagnosticSink) -> ReactionResult {
        let created_at = lead.created_at;
        if lead.notes.is_empty() && lead.events.is_empty() && lead.tasks.is_empty() {
            sink.try_emit(DataGap::new(lead.id, DataGapKind::EmptyTimeline, "no notes, events or tasks"));
        }

        let timeline = Timeline::build(
            lead,
            created_at,
            &self.refs.users,
            &self.refs.pipelines,
            self.labels,
            sink,
        );

        let tags = lead.tag_names().collect::<Vec<_>>().join(", ");
        let input_field = lead.input_field().unwrap_or_default();
        let creation_source = infer_creation_source(&SourceHints {
            name: &lead.name,
            tags: &tags,
            input_field: &input_field,
            creation_notes: &timeline.creation_notes,
            creation_events: &timeline.creation_events,
        });
        if creation_source.is_empty() {
            sink.try_emit(DataGap::new(lead.id, DataGapKind::MissingCreationSource, ""));
        }

        let mut latencies: BTreeMap<Channel, i64> = timeline
            .channels
            .iter()
            .filter_map(|(channel, items)| first_latency(items, created_at).map(|l| (*channel, l)))
            .collect();
        let fastest = resolve_fastest(&mut latencies);

        let fastest_time = fastest.and_then(|c| latencies.get(&c).copied()).unwrap_or(0);
        let first_successful_incoming_call =
            first_successful_incoming(&timeline).is_some_and(|speed| speed > -1 && speed < fastest_time);

        let on_duty = self
            .schedule
            .is_some_and(|s| s.is_on_duty(self.time.to_local(created_at)));

        let communication = self.communication_stats.then(|| communication_stats(&timeline));

        debug!(
            lead_id = lead.id,
            fastest = fastest.map(Channel::as_str).unwrap_or_default(),
            on_duty,
            "Analysed reaction"
        );

        ReactionResult {
            created_at,
            creation_source,
            latencies,
            fastest,
            first_successful_incoming_call,
            on_duty,
            communication,
        }
    }

    /// Analyses a lead and writes the result into its record.
    ///
    /// Deleted records keep empty reaction columns. Non-leads only get the
    /// `duty time` default.
    pub fn process(
        &self,
        lead: &RawLead,
        record: &mut OutputRecord,
        sink: &dyn DiagnosticSink,
    ) -> Option<ReactionResult> {
        record.reaction = ReactionFields::default();
        record.communication = None;
        if record.deleted {
            return None;
        }
        record.reaction.duty_time = "duty time".to_string();
        if !record.is_lead {
            return None;
        }
        let result = self.analyze(lead, sink);
        record.reaction = result.to_fields();
        record.communication = result.communication;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingSink, NoOpSink};
    use crate::model::{
        Event, EventKind, EventValue, Note, NoteKind, NoteParams, Pipeline, PipelineDirectory,
        StatusRef, Task, User, UserDirectory,
    };
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    // Monday 2024-03-04 10:00:00 UTC.
    const T0: i64 = 1_709_546_400;

    fn refs() -> ReferenceData {
        ReferenceData::new(
            PipelineDirectory::new().with_pipeline(
                10,
                Pipeline::new("Main")
                    .with_status(1, "НОВЫЕ ЗАЯВКИ")
                    .with_status(2, "1. TRYING TO GET IN TOUCH")
                    .with_status(3, "Closed - lost"),
            ),
            UserDirectory::new().with_user(5, User::named("Ana")),
        )
    }

    fn time() -> TimeConverter {
        TimeConverter::new(0).unwrap().with_host_offset(0)
    }

    fn call(kind: NoteKind, at: i64, source: &str, duration: serde_json::Value) -> Note {
        Note {
            note_type: kind,
            created_at: at,
            created_by: Some(5),
            params: NoteParams {
                source: Some(source.to_string()),
                duration: Some(duration),
                ..NoteParams::default()
            },
        }
    }

    fn status_change(at: i64, status: i64) -> Event {
        Event {
            kind: EventKind::StageChanged,
            created_at: at,
            created_by: 5,
            value_before: vec![EventValue {
                lead_status: Some(StatusRef { id: 1, pipeline_id: 10 }),
                message: None,
            }],
            value_after: vec![EventValue {
                lead_status: Some(StatusRef { id: status, pipeline_id: 10 }),
                message: None,
            }],
        }
    }

    fn lead_record(lead: &RawLead) -> OutputRecord {
        let mut record = OutputRecord::new(lead.id, time().local_date(lead.created_at));
        record.is_lead = true;
        record
    }

    #[test]
    fn test_outgoing_call_beats_status_change() {
        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![call(NoteKind::CallOut, T0 + 120, "itgrix_amo", json!(130))];
        lead.events = vec![status_change(T0 + 400, 2)];
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let analyzer = ReactionAnalyzer::new(&refs, &time, &labels);

        let result = analyzer.analyze(&lead, &NoOpSink);
        assert_eq!(result.fastest, Some(Channel::OutgoingCall));
        assert_eq!(result.fastest_latency(), Some(120));
        assert_eq!(result.latency(Channel::TryingToGetInTouch), Some(400));

        let mut record = lead_record(&lead);
        analyzer.process(&lead, &mut record, &NoOpSink);
        assert_eq!(record.reaction.reaction_type, "outgoing_call");
        assert_eq!(record.reaction.duty_time, "off time");
        assert_eq!(record.reaction.reaction_time_off_duty_sec, Some(120));
        assert!(record.reaction.callback.less_300);
    }

    #[test]
    fn test_creation_window_is_not_a_reaction() {
        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![
            call(NoteKind::CallOut, T0 + 10, "itgrix_amo", json!(60)),
            call(NoteKind::CallOut, T0 + 11, "itgrix_amo", json!(60)),
        ];
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let result = ReactionAnalyzer::new(&refs, &time, &labels).analyze(&lead, &NoOpSink);

        assert_eq!(result.creation_source, "Outgoing call itgrix_amo");
        assert_eq!(result.latency(Channel::OutgoingCall), Some(11));
    }

    #[test]
    fn test_duty_bucketing() {
        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![Note {
            note_type: NoteKind::Common,
            created_at: T0 + 250,
            created_by: Some(5),
            params: NoteParams::default(),
        }];
        let schedule = DutySchedule::new()
            .with_day(
                0,
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            )
            .unwrap();
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let analyzer = ReactionAnalyzer::new(&refs, &time, &labels).with_schedule(&schedule);

        let mut record = lead_record(&lead);
        analyzer.process(&lead, &mut record, &NoOpSink);
        let fields = &record.reaction;
        assert_eq!(fields.duty_time, "duty time");
        assert_eq!(fields.reaction_time_on_duty_sec, Some(250));
        assert!(fields.reaction_on_duty.less_300);
        assert_eq!(fields.reaction_off_duty, LatencyBuckets::default());
        assert_eq!(fields.reaction_time_off_duty_sec, None);
        assert!(fields.callback_on_duty.missing);
    }

    #[test]
    fn test_items_before_creation_are_not_reactions() {
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let analyzer = ReactionAnalyzer::new(&refs, &time, &labels);

        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![
            call(NoteKind::CallOut, T0 - 100, "itgrix_amo", json!(60)),
            call(NoteKind::CallOut, T0 + 50, "itgrix_amo", json!(60)),
        ];
        let result = analyzer.analyze(&lead, &NoOpSink);
        assert_eq!(result.latency(Channel::OutgoingCall), Some(50));
        assert!(result.latencies.values().all(|l| *l >= 0));

        let mut record = lead_record(&lead);
        analyzer.process(&lead, &mut record, &NoOpSink);
        assert_eq!(record.reaction.reaction_type, "outgoing_call");
        assert_eq!(record.reaction.reaction_time_off_duty_sec, Some(50));
        assert_eq!(record.reaction.reaction_time_on_duty_sec, None);

        let mut early_only = RawLead::new(2, T0);
        early_only.notes = vec![call(NoteKind::CallOut, T0 - 100, "itgrix_amo", json!(60))];
        let result = analyzer.analyze(&early_only, &NoOpSink);
        assert_eq!(result.fastest, None);
        assert_eq!(result.latency(Channel::OutgoingCall), None);

        let mut record = lead_record(&early_only);
        analyzer.process(&early_only, &mut record, &NoOpSink);
        assert_eq!(record.reaction.reaction_type, "");
        assert_eq!(record.reaction.reaction_time_off_duty_sec, None);
        assert_eq!(record.reaction.reaction_time_on_duty_sec, None);
        assert!(record.reaction.reaction.missing);
        assert!(record.reaction.callback.missing);
    }

    #[test]
    fn test_creation_at_window_start_is_off_duty() {
        // T0 is 10:00 in the tenant zone.
        let schedule = DutySchedule::new()
            .with_day(
                0,
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            )
            .unwrap();
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let analyzer = ReactionAnalyzer::new(&refs, &time, &labels).with_schedule(&schedule);

        let mut at_start = RawLead::new(1, T0);
        at_start.notes = vec![call(NoteKind::CallOut, T0 + 120, "itgrix_amo", json!(130))];
        let mut record = lead_record(&at_start);
        analyzer.process(&at_start, &mut record, &NoOpSink);
        assert_eq!(record.reaction.duty_time, "off time");
        assert_eq!(record.reaction.reaction_time_off_duty_sec, Some(120));

        let mut just_after = RawLead::new(2, T0 + 1);
        just_after.notes = vec![call(NoteKind::CallOut, T0 + 121, "itgrix_amo", json!(130))];
        let mut record = lead_record(&just_after);
        analyzer.process(&just_after, &mut record, &NoOpSink);
        assert_eq!(record.reaction.duty_time, "duty time");
    }

    #[test]
    fn test_no_data_lead() {
        let lead = RawLead::new(1, T0);
        let sink = CollectingSink::new();
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let analyzer = ReactionAnalyzer::new(&refs, &time, &labels);

        let mut record = lead_record(&lead);
        let result = analyzer.process(&lead, &mut record, &sink).unwrap();
        assert_eq!(result.fastest, None);
        assert!(result.latencies.is_empty());
        assert_eq!(record.reaction.reaction_type, "");
        assert_eq!(record.reaction.creation_source, "");
        assert_eq!(record.reaction.reaction_time_off_duty_sec, None);
        assert!(record.reaction.reaction.missing);
        assert!(!record.reaction.first_successful_incoming_call);
        assert_eq!(sink.gaps_of_kind(DataGapKind::EmptyTimeline).len(), 1);
        assert_eq!(sink.gaps_of_kind(DataGapKind::MissingCreationSource).len(), 1);
    }

    #[test]
    fn test_secondary_fallback() {
        let mut lead = RawLead::new(1, T0);
        lead.events = vec![status_change(T0 + 900, 3), status_change(T0 + 700, 2)];
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let result = ReactionAnalyzer::new(&refs, &time, &labels).analyze(&lead, &NoOpSink);

        assert_eq!(result.fastest, Some(Channel::TryingToGetInTouch));
        assert_eq!(result.fastest_latency(), Some(700));
        assert_eq!(result.latency(Channel::Closed), Some(900));
    }

    #[test]
    fn test_completed_task_is_direct() {
        let mut lead = RawLead::new(1, T0);
        lead.events = vec![status_change(T0 + 100, 2)];
        lead.tasks = vec![Task {
            is_completed: true,
            updated_at: T0 + 600,
            responsible_user_id: Some(5),
        }];
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let result = ReactionAnalyzer::new(&refs, &time, &labels).analyze(&lead, &NoOpSink);

        assert_eq!(result.fastest, Some(Channel::CompletedTask));
        assert_eq!(result.fastest_latency(), Some(600));
    }

    #[test]
    fn test_first_successful_incoming_call() {
        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![
            call(NoteKind::CallIn, T0 + 30, "moizvonkiru", json!("")),
            call(NoteKind::CallIn, T0 + 60, "moizvonkiru", json!("45")),
            call(NoteKind::CallOut, T0 + 900, "itgrix_amo", json!(10)),
        ];
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let analyzer = ReactionAnalyzer::new(&refs, &time, &labels);
        assert!(analyzer.analyze(&lead, &NoOpSink).first_successful_incoming_call);

        lead.notes.pop();
        assert!(!analyzer.analyze(&lead, &NoOpSink).first_successful_incoming_call);
    }

    #[test]
    fn test_skips_deleted_and_non_leads() {
        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![call(NoteKind::CallOut, T0 + 120, "itgrix_amo", json!(130))];
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let analyzer = ReactionAnalyzer::new(&refs, &time, &labels);

        let mut deleted = lead_record(&lead);
        deleted.deleted = true;
        assert!(analyzer.process(&lead, &mut deleted, &NoOpSink).is_none());
        assert_eq!(deleted.reaction, ReactionFields::default());

        let mut not_lead = lead_record(&lead);
        not_lead.is_lead = false;
        assert!(analyzer.process(&lead, &mut not_lead, &NoOpSink).is_none());
        assert_eq!(not_lead.reaction.duty_time, "duty time");
        assert_eq!(not_lead.reaction.reaction_type, "");
    }

    #[test]
    fn test_communication_stats_opt_in() {
        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![call(NoteKind::CallOut, T0 + 120, "itgrix_amo", json!(130))];
        let (refs, time, labels) = (refs(), time(), StatusLabels::default());
        let analyzer = ReactionAnalyzer::new(&refs, &time, &labels).with_communication_stats(true);

        let mut record = lead_record(&lead);
        analyzer.process(&lead, &mut record, &NoOpSink);
        let stats = record.communication.unwrap();
        assert_eq!(stats.outgoing_call_quantity, 1);
        assert_eq!(stats.outgoing_call_duration, 130);
    }
}
