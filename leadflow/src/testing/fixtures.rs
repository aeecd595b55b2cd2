//! Builders for raw leads and reference data.

use serde_json::{json, Value};

use crate::model::{
    ChatMessage, Contact, CustomField, CustomValue, Deletion, Event, EventKind, EventValue,
    LossReason, Note, NoteKind, NoteParams, Pipeline, PipelineDirectory, RawLead, ReferenceData,
    StatusRef, Tag, Task, User, UserDirectory,
};

/// Fluent builder for a [`RawLead`] and its timeline.
#[derive(Debug, Clone)]
pub struct LeadFixture {
    lead: RawLead,
}

impl LeadFixture {
    /// A lead created at `created_at` (epoch seconds).
    #[must_use]
    pub fn new(id: i64, created_at: i64) -> Self {
        Self {
            lead: RawLead::new(id, created_at),
        }
    }

    /// Places the lead in a pipeline status.
    #[must_use]
    pub const fn in_status(mut self, pipeline_id: i64, status_id: i64) -> Self {
        self.lead.pipeline_id = Some(pipeline_id);
        self.lead.status_id = Some(status_id);
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.lead.name = name.into();
        self
    }

    /// Sets the deal value.
    #[must_use]
    pub const fn with_price(mut self, price: i64) -> Self {
        self.lead.price = Some(price);
        self
    }

    /// Sets the owner.
    #[must_use]
    pub const fn with_responsible(mut self, user_id: i64) -> Self {
        self.lead.responsible_user_id = Some(user_id);
        self
    }

    /// Sets the update time.
    #[must_use]
    pub const fn updated_at(mut self, ts: i64) -> Self {
        self.lead.updated_at = Some(ts);
        self
    }

    /// Sets the closing time.
    #[must_use]
    pub const fn closed_at(mut self, ts: i64) -> Self {
        self.lead.closed_at = Some(ts);
        self
    }

    /// Adds a custom field with one value.
    #[must_use]
    pub fn with_custom(mut self, name: &str, value: Value) -> Self {
        self.lead.custom_fields_values.push(CustomField::new(name, value));
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, name: &str) -> Self {
        self.lead.embedded.tags.push(Tag {
            name: name.to_string(),
        });
        self
    }

    /// Sets the loss reason.
    #[must_use]
    pub fn with_loss_reason(mut self, name: &str) -> Self {
        self.lead.embedded.loss_reason = vec![LossReason {
            name: name.to_string(),
        }];
        self
    }

    /// Links a contact carrying `phone`.
    #[must_use]
    pub fn with_phone(mut self, phone: &str) -> Self {
        let field = CustomField {
            field_name: "Телефон".to_string(),
            field_code: Some("PHONE".to_string()),
            values: vec![CustomValue {
                value: json!(phone),
            }],
        };
        self.lead.contacts.push(Contact {
            custom_fields_values: vec![field],
        });
        self
    }

    /// Marks the lead deleted.
    #[must_use]
    pub const fn deleted(mut self, at: i64, by: i64) -> Self {
        self.lead.deleted = Some(Deletion {
            user_id: Some(by),
            at: Some(at),
        });
        self
    }

    /// Adds an arbitrary event.
    #[must_use]
    pub fn with_event(mut self, event: Event) -> Self {
        self.lead.events.push(event);
        self
    }

    /// Adds an event of `kind` without payload.
    #[must_use]
    pub fn event(self, kind: EventKind, at: i64, by: i64) -> Self {
        self.with_event(Event {
            kind,
            created_at: at,
            created_by: by,
            value_before: Vec::new(),
            value_after: Vec::new(),
        })
    }

    /// Adds a status change.
    #[must_use]
    pub fn status_change(self, at: i64, by: i64, from: (i64, i64), to: (i64, i64)) -> Self {
        let status = |(pipeline_id, id): (i64, i64)| EventValue {
            lead_status: Some(StatusRef { id, pipeline_id }),
            message: None,
        };
        self.with_event(Event {
            kind: EventKind::StageChanged,
            created_at: at,
            created_by: by,
            value_before: vec![status(from)],
            value_after: vec![status(to)],
        })
    }

    /// Adds a chat message event from `origin`.
    #[must_use]
    pub fn chat(self, incoming: bool, at: i64, by: i64, origin: &str) -> Self {
        let kind = if incoming {
            EventKind::IncomingChat
        } else {
            EventKind::OutgoingChat
        };
        self.with_event(Event {
            kind,
            created_at: at,
            created_by: by,
            value_before: Vec::new(),
            value_after: vec![EventValue {
                lead_status: None,
                message: Some(ChatMessage {
                    origin: Some(origin.to_string()),
                }),
            }],
        })
    }

    /// Adds an arbitrary note.
    #[must_use]
    pub fn with_note(mut self, note: Note) -> Self {
        self.lead.notes.push(note);
        self
    }

    /// Adds a call note from telephony `source` with a duration in seconds.
    #[must_use]
    pub fn call_note(self, incoming: bool, at: i64, by: i64, source: &str, duration: i64) -> Self {
        let note_type = if incoming {
            NoteKind::CallIn
        } else {
            NoteKind::CallOut
        };
        self.with_note(Note {
            note_type,
            created_at: at,
            created_by: Some(by),
            params: NoteParams {
                source: Some(source.to_string()),
                duration: Some(json!(duration)),
                ..NoteParams::default()
            },
        })
    }

    /// Adds a free-text note.
    #[must_use]
    pub fn text_note(self, at: i64, by: i64, text: &str) -> Self {
        self.with_note(Note {
            note_type: NoteKind::Common,
            created_at: at,
            created_by: Some(by),
            params: NoteParams {
                text: Some(text.to_string()),
                ..NoteParams::default()
            },
        })
    }

    /// Adds a task.
    #[must_use]
    pub fn task(mut self, updated_at: i64, completed: bool, user: i64) -> Self {
        self.lead.tasks.push(Task {
            is_completed: completed,
            updated_at,
            responsible_user_id: Some(user),
        });
        self
    }

    /// The finished lead.
    #[must_use]
    pub fn build(self) -> RawLead {
        self.lead
    }
}

/// Fluent builder for [`ReferenceData`].
#[derive(Debug, Clone, Default)]
pub struct ReferenceFixture {
    pipelines: PipelineDirectory,
    users: UserDirectory,
}

impl ReferenceFixture {
    /// Empty dictionaries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pipeline with its statuses.
    #[must_use]
    pub fn pipeline(mut self, id: i64, name: &str, statuses: &[(i64, &str)]) -> Self {
        let pipeline = statuses
            .iter()
            .fold(Pipeline::new(name), |p, (sid, label)| p.with_status(*sid, *label));
        self.pipelines.insert(id, pipeline);
        self
    }

    /// Adds a user.
    #[must_use]
    pub fn user(mut self, id: i64, name: &str) -> Self {
        self.users.insert(id, User::named(name));
        self
    }

    /// Adds a user with a group.
    #[must_use]
    pub fn user_in_group(mut self, id: i64, name: &str, group: &str) -> Self {
        let mut user = User::named(name);
        user.group = Some(group.to_string());
        self.users.insert(id, user);
        self
    }

    /// The finished dictionaries.
    #[must_use]
    pub fn build(self) -> ReferenceData {
        ReferenceData::new(self.pipelines, self.users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lead_fixture() {
        let lead = LeadFixture::new(1, 1000)
            .in_status(10, 2)
            .with_tag("jivo")
            .with_loss_reason("Spam")
            .with_phone("+381 64 123")
            .status_change(1100, 5, (10, 1), (10, 2))
            .chat(true, 1050, 0, "instagram")
            .call_note(false, 1200, 5, "itgrix_amo", 30)
            .task(1300, true, 5)
            .build();

        assert_eq!(lead.status_id, Some(2));
        assert_eq!(lead.loss_reason(), Some("Spam"));
        assert_eq!(lead.contact_phones(), vec!["38164123".to_string()]);
        assert_eq!(lead.events[0].status_after(), Some(StatusRef { id: 2, pipeline_id: 10 }));
        assert_eq!(lead.events[1].message_origin(), Some("instagram"));
        assert_eq!(lead.notes.len(), 1);
        assert_eq!(lead.tasks.len(), 1);
    }

    #[test]
    fn test_reference_fixture() {
        let refs = ReferenceFixture::new()
            .pipeline(10, "Main", &[(1, "НОВЫЕ ЗАЯВКИ")])
            .user_in_group(5, "Ana", "Sales")
            .build();

        assert_eq!(
            refs.pipelines.status_label(StatusRef { id: 1, pipeline_id: 10 }),
            Some("НОВЫЕ ЗАЯВКИ")
        );
        assert_eq!(refs.users.name_of(Some(5)), Some("Ana"));
    }
}
