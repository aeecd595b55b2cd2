//! Buckets a lead's notes, events and tasks into interaction channels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::events::{DataGap, DataGapKind, DiagnosticSink};
use crate::funnel::StatusLabels;
use crate::model::{
    CallDuration, Event, EventKind, Note, NoteKind, PipelineDirectory, RawLead, UserDirectory,
};

/// Seconds around creation within which items count as creation-time.
pub const CREATION_WINDOW_SECS: i64 = 10;

/// Telephony integrations whose calls are tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CallProvider {
    /// `itgrix_amo`.
    Itgrix,
    /// `moizvonkiru`.
    Moizvonki,
}

impl CallProvider {
    /// Providers in override-scan order.
    pub const ALL: [Self; 2] = [Self::Itgrix, Self::Moizvonki];

    /// Wire name of the provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Itgrix => "itgrix_amo",
            Self::Moizvonki => "moizvonkiru",
        }
    }

    /// Parses a note `source` parameter.
    #[must_use]
    pub fn from_source(source: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == source)
    }
}

/// Interaction channel of a timeline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Inbound call note.
    IncomingCall,
    /// Outbound call note.
    OutgoingCall,
    /// Inbound email note.
    IncomingEmail,
    /// Outbound email note.
    OutgoingEmail,
    /// Inbound chat event.
    IncomingChat,
    /// Outbound chat event.
    OutgoingChat,
    /// Free-text note by a known user.
    UserNote,
    /// Completed task.
    CompletedTask,
    /// Owner reassigned by a known user.
    Reassignment,
    /// Moved into a "trying to get in touch" status.
    TryingToGetInTouch,
    /// Moved into a lost status.
    Closed,
}

impl Channel {
    /// Snake-case name, as written to `reaction_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IncomingCall => "incoming_call",
            Self::OutgoingCall => "outgoing_call",
            Self::IncomingEmail => "incoming_email",
            Self::OutgoingEmail => "outgoing_email",
            Self::IncomingChat => "incoming_chat",
            Self::OutgoingChat => "outgoing_chat",
            Self::UserNote => "user_note",
            Self::CompletedTask => "completed_task",
            Self::Reassignment => "reassignment",
            Self::TryingToGetInTouch => "trying_to_get_in_touch",
            Self::Closed => "closed",
        }
    }

    /// Inbound channels keep creation-time items.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        matches!(self, Self::IncomingCall | Self::IncomingEmail | Self::IncomingChat)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bucketed interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineItem {
    /// Epoch seconds.
    pub at: i64,
    /// Author or assignee name.
    pub user: Option<String>,
    /// Call duration, for call notes.
    pub duration: Option<CallDuration>,
}

/// A lead's interactions grouped by channel, in time order.
#[derive(Debug, Clone, Default)]
pub struct Timeline<'a> {
    /// Creation timestamp the window is measured from.
    pub created_at: i64,
    /// Items per channel.
    pub channels: BTreeMap<Channel, Vec<TimelineItem>>,
    /// Inbound calls per provider.
    pub incoming_by_provider: BTreeMap<CallProvider, Vec<TimelineItem>>,
    /// Outbound calls per provider.
    pub outgoing_by_provider: BTreeMap<CallProvider, Vec<TimelineItem>>,
    /// Notes in the creation window.
    pub creation_notes: Vec<&'a Note>,
    /// Events in the creation window.
    pub creation_events: Vec<&'a Event>,
}

impl<'a> Timeline<'a> {
    /// Items of a channel, empty when none.
    #[must_use]
    pub fn channel(&self, channel: Channel) -> &[TimelineItem] {
        self.channels.get(&channel).map(Vec::as_slice).unwrap_or_default()
    }

    /// Inbound calls of one provider.
    #[must_use]
    pub fn incoming(&self, provider: CallProvider) -> &[TimelineItem] {
        self.incoming_by_provider.get(&provider).map(Vec::as_slice).unwrap_or_default()
    }

    /// Outbound calls of one provider.
    #[must_use]
    pub fn outgoing(&self, provider: CallProvider) -> &[TimelineItem] {
        self.outgoing_by_provider.get(&provider).map(Vec::as_slice).unwrap_or_default()
    }

    fn push(&mut self, channel: Channel, item: TimelineItem, at_creation: bool) {
        if at_creation && !channel.is_inbound() {
            return;
        }
        self.channels.entry(channel).or_default().push(item);
    }

    /// Buckets the lead's timeline. Notes and events are sorted first.
    #[must_use]
    pub fn build(
        lead: &'a RawLead,
        created_at: i64,
        users: &UserDirectory,
        pipelines: &PipelineDirectory,
        labels: &StatusLabels,
        sink: &dyn DiagnosticSink,
    ) -> Self {
        let mut timeline = Self {
            created_at,
            ..Self::default()
        };
        let user_name = |id: Option<i64>| -> Option<String> {
            let name = users.name_of(id).map(ToString::to_string);
            if name.is_none() {
                if let Some(id) = id.filter(|id| *id > 0) {
                    sink.try_emit(DataGap::new(lead.id, DataGapKind::UnknownUser, id.to_string()));
                }
            }
            name
        };
        let created_marker = created_at.to_string();

        let mut notes: Vec<&Note> = lead.notes.iter().collect();
        notes.sort_by_key(|n| n.created_at);
        for note in notes {
            let at_creation = if (note.created_at - created_at).abs() <= CREATION_WINDOW_SECS {
                true
            } else {
                note.note_type == NoteKind::CallIn && note.params.uniq_contains(&created_marker)
            };
            if at_creation {
                timeline.creation_notes.push(note);
            }

            let user = user_name(note.created_by);
            let duration = note.params.call_duration();
            let item = TimelineItem {
                at: note.created_at,
                user: user.clone(),
                duration: None,
            };
            match note.note_type {
                NoteKind::Email => {
                    let channel = if note.params.income.unwrap_or(false) {
                        Channel::IncomingEmail
                    } else {
                        Channel::OutgoingEmail
                    };
                    timeline.push(channel, item, at_creation);
                }
                NoteKind::CallIn | NoteKind::CallOut => {
                    if duration == CallDuration::Garbage {
                        sink.try_emit(DataGap::new(
                            lead.id,
                            DataGapKind::MalformedCallDuration,
                            format!("{:?}", note.params.duration),
                        ));
                    }
                    let item = TimelineItem {
                        duration: Some(duration),
                        ..item
                    };
                    let (channel, by_provider) = if note.note_type == NoteKind::CallIn {
                        (Channel::IncomingCall, &mut timeline.incoming_by_provider)
                    } else {
                        (Channel::OutgoingCall, &mut timeline.outgoing_by_provider)
                    };
                    let provider = note.params.source.as_deref().and_then(CallProvider::from_source);
                    if let Some(provider) = provider {
                        if channel.is_inbound() || !at_creation {
                            by_provider.entry(provider).or_default().push(item.clone());
                        }
                    }
                    timeline.push(channel, item, at_creation);
                }
                NoteKind::Common if user.is_some() => {
                    timeline.push(Channel::UserNote, item, at_creation);
                }
                _ => {}
            }
        }

        let mut events: Vec<&Event> = lead.events.iter().collect();
        events.sort_by_key(|e| e.created_at);
        for event in events {
            let at_creation = (event.created_at - created_at).abs() <= CREATION_WINDOW_SECS;
            if at_creation {
                timeline.creation_events.push(event);
            }
            let user = user_name(Some(event.created_by));
            let channel = match event.kind {
                EventKind::StageChanged => event
                    .status_after()
                    .and_then(|s| pipelines.status_label(s))
                    .and_then(|label| {
                        if labels.is_trying_to_get_in_touch(label) {
                            Some(Channel::TryingToGetInTouch)
                        } else if labels.is_closed_failed(label) {
                            Some(Channel::Closed)
                        } else {
                            None
                        }
                    }),
                EventKind::ResponsibleChanged if user.is_some() => Some(Channel::Reassignment),
                EventKind::IncomingChat => Some(Channel::IncomingChat),
                EventKind::OutgoingChat => Some(Channel::OutgoingChat),
                _ => None,
            };
            if let Some(channel) = channel {
                let item = TimelineItem {
                    at: event.created_at,
                    user,
                    duration: None,
                };
                timeline.push(channel, item, at_creation);
            }
        }

        let mut tasks: Vec<TimelineItem> = lead
            .tasks
            .iter()
            .filter(|t| t.is_completed)
            .map(|t| TimelineItem {
                at: t.updated_at,
                user: users.name_of(t.responsible_user_id).map(ToString::to_string),
                duration: None,
            })
            .collect();
        tasks.sort_by_key(|t| t.at);
        if !tasks.is_empty() {
            timeline.channels.insert(Channel::CompletedTask, tasks);
        }

        timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingSink, NoOpSink};
    use crate::model::{NoteParams, Task, User};
    use serde_json::json;

    const T0: i64 = 1_709_546_400;

    fn note(kind: NoteKind, at: i64, params: NoteParams) -> Note {
        Note {
            note_type: kind,
            created_at: at,
            created_by: Some(5),
            params,
        }
    }

    fn call(source: &str, duration: serde_json::Value) -> NoteParams {
        NoteParams {
            source: Some(source.to_string()),
            duration: Some(duration),
            ..NoteParams::default()
        }
    }

    fn users() -> UserDirectory {
        UserDirectory::new().with_user(5, User::named("Ana"))
    }

    #[test]
    fn test_creation_window_boundary() {
        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![
            note(NoteKind::CallOut, T0 + 10, call("itgrix_amo", json!(30))),
            note(NoteKind::CallOut, T0 + 11, call("itgrix_amo", json!(30))),
        ];
        let (u, p, l) = (users(), PipelineDirectory::new(), StatusLabels::default());
        let timeline = Timeline::build(&lead, T0, &u, &p, &l, &NoOpSink);

        assert_eq!(timeline.creation_notes.len(), 1);
        assert_eq!(timeline.creation_notes[0].created_at, T0 + 10);
        let outgoing = timeline.channel(Channel::OutgoingCall);
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].at, T0 + 11);
        assert_eq!(timeline.outgoing(CallProvider::Itgrix).len(), 1);
    }

    #[test]
    fn test_uniq_marks_creation_call() {
        let mut lead = RawLead::new(1, T0);
        let params = NoteParams {
            uniq: Some(json!(format!("{T0}.12345"))),
            ..call("moizvonkiru", json!(40))
        };
        lead.notes = vec![note(NoteKind::CallIn, T0 + 600, params)];
        let (u, p, l) = (users(), PipelineDirectory::new(), StatusLabels::default());
        let timeline = Timeline::build(&lead, T0, &u, &p, &l, &NoOpSink);

        assert_eq!(timeline.creation_notes.len(), 1);
        assert_eq!(timeline.incoming(CallProvider::Moizvonki).len(), 1);
        assert_eq!(timeline.channel(Channel::IncomingCall).len(), 1);
    }

    #[test]
    fn test_user_notes_need_known_author() {
        let mut lead = RawLead::new(1, T0);
        let mut anonymous = note(NoteKind::Common, T0 + 100, NoteParams::default());
        anonymous.created_by = Some(99);
        lead.notes = vec![note(NoteKind::Common, T0 + 200, NoteParams::default()), anonymous];
        let sink = CollectingSink::new();
        let (u, p, l) = (users(), PipelineDirectory::new(), StatusLabels::default());
        let timeline = Timeline::build(&lead, T0, &u, &p, &l, &sink);

        assert_eq!(timeline.channel(Channel::UserNote).len(), 1);
        assert_eq!(timeline.channel(Channel::UserNote)[0].user.as_deref(), Some("Ana"));
        assert_eq!(sink.gaps_of_kind(DataGapKind::UnknownUser).len(), 1);
    }

    #[test]
    fn test_completed_tasks_sorted() {
        let mut lead = RawLead::new(1, T0);
        lead.tasks = vec![
            Task { is_completed: true, updated_at: T0 + 900, responsible_user_id: Some(5) },
            Task { is_completed: false, updated_at: T0 + 100, responsible_user_id: Some(5) },
            Task { is_completed: true, updated_at: T0 + 500, responsible_user_id: None },
        ];
        let (u, p, l) = (users(), PipelineDirectory::new(), StatusLabels::default());
        let timeline = Timeline::build(&lead, T0, &u, &p, &l, &NoOpSink);

        let tasks = timeline.channel(Channel::CompletedTask);
        assert_eq!(tasks.iter().map(|t| t.at).collect::<Vec<_>>(), vec![T0 + 500, T0 + 900]);
    }

    #[test]
    fn test_garbage_duration_reported() {
        let mut lead = RawLead::new(1, T0);
        lead.notes = vec![note(NoteKind::CallIn, T0 + 60, call("itgrix_amo", json!("n/a")))];
        let sink = CollectingSink::new();
        let (u, p, l) = (users(), PipelineDirectory::new(), StatusLabels::default());
        let timeline = Timeline::build(&lead, T0, &u, &p, &l, &sink);

        assert_eq!(
            timeline.incoming(CallProvider::Itgrix)[0].duration,
            Some(CallDuration::Garbage)
        );
        assert_eq!(sink.gaps_of_kind(DataGapKind::MalformedCallDuration).len(), 1);
    }
}
