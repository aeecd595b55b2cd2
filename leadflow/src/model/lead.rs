//! The lead entity as fetched from the CRM.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::timeline::{Event, Note, Task};
use crate::utils::clear_phone;

/// One value of a custom field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomValue {
    /// Raw value: text, number, bool or epoch date.
    #[serde(default)]
    pub value: Value,
}

/// A custom field with its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    /// Display name configured in the CRM.
    pub field_name: String,
    /// System code (`PHONE`, `EMAIL`, `INPUT`, ...).
    #[serde(default)]
    pub field_code: Option<String>,
    /// Values, usually one.
    #[serde(default)]
    pub values: Vec<CustomValue>,
}

impl CustomField {
    /// Creates a single-valued field.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            field_name: name.into(),
            field_code: None,
            values: vec![CustomValue { value }],
        }
    }

    /// Sets the system code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.field_code = Some(code.into());
        self
    }

    /// The first value, or `Null`.
    #[must_use]
    pub fn first(&self) -> &Value {
        self.values.first().map_or(&Value::Null, |v| &v.value)
    }

    /// The first value rendered as text.
    #[must_use]
    pub fn first_text(&self) -> String {
        value_text(self.first())
    }
}

/// Renders a JSON scalar the way it reads in a spreadsheet cell.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Returns true if a JSON scalar counts as filled in.
#[must_use]
pub fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// A tag on a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag text.
    pub name: String,
}

/// A contact linked to a lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact custom fields, including phones.
    #[serde(default)]
    pub custom_fields_values: Vec<CustomField>,
}

/// A loss reason entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossReason {
    /// Reason label.
    pub name: String,
}

/// Deletion metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    /// User who deleted the lead.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Epoch seconds of the deletion.
    #[serde(default)]
    pub at: Option<i64>,
}

/// Embedded collections as the CRM nests them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embedded {
    /// Tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Loss reasons.
    #[serde(default)]
    pub loss_reason: Vec<LossReason>,
}

/// A lead as fetched, optionally with its denormalised timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLead {
    /// Source-assigned id.
    pub id: i64,
    /// Lead title.
    #[serde(default)]
    pub name: String,
    /// Deal value.
    #[serde(default)]
    pub price: Option<i64>,
    /// Current pipeline.
    #[serde(default)]
    pub pipeline_id: Option<i64>,
    /// Current status within the pipeline.
    #[serde(default)]
    pub status_id: Option<i64>,
    /// Epoch seconds.
    pub created_at: i64,
    /// Epoch seconds.
    #[serde(default)]
    pub updated_at: Option<i64>,
    /// Epoch seconds.
    #[serde(default)]
    pub closed_at: Option<i64>,
    /// Owner.
    #[serde(default)]
    pub responsible_user_id: Option<i64>,
    /// Custom field values.
    #[serde(default)]
    pub custom_fields_values: Vec<CustomField>,
    /// Nested tags and loss reasons.
    #[serde(default, rename = "_embedded")]
    pub embedded: Embedded,
    /// Linked contacts.
    #[serde(default)]
    pub contacts: Vec<Contact>,
    /// Set when the lead was deleted.
    #[serde(default)]
    pub deleted: Option<Deletion>,
    /// Set when the lead disappeared through a merge.
    #[serde(default)]
    pub merged: bool,
    /// Events, when denormalised.
    #[serde(default)]
    pub events: Vec<Event>,
    /// Notes, when denormalised.
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Tasks, when denormalised.
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl RawLead {
    /// Creates a bare lead.
    #[must_use]
    pub fn new(id: i64, created_at: i64) -> Self {
        Self {
            id,
            name: String::new(),
            price: None,
            pipeline_id: None,
            status_id: None,
            created_at,
            updated_at: None,
            closed_at: None,
            responsible_user_id: None,
            custom_fields_values: Vec::new(),
            embedded: Embedded::default(),
            contacts: Vec::new(),
            deleted: None,
            merged: false,
            events: Vec::new(),
            notes: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Tag names in CRM order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.embedded.tags.iter().map(|t| t.name.as_str())
    }

    /// The first loss reason label, if any.
    #[must_use]
    pub fn loss_reason(&self) -> Option<&str> {
        self.embedded.loss_reason.first().map(|r| r.name.as_str())
    }

    /// Returns true when the lead was deleted or merged away.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.deleted.is_some() || self.merged
    }

    /// Finds a custom field by display name.
    #[must_use]
    pub fn custom_field(&self, name: &str) -> Option<&CustomField> {
        self.custom_fields_values.iter().find(|f| f.field_name == name)
    }

    /// Value of the `INPUT` system field (capture-form payload).
    #[must_use]
    pub fn input_field(&self) -> Option<String> {
        self.custom_fields_values
            .iter()
            .find(|f| f.field_code.as_deref() == Some("INPUT"))
            .map(CustomField::first_text)
    }

    /// Normalised contact values for a system code, e.g. `PHONE`.
    #[must_use]
    pub fn contact_phones(&self) -> Vec<String> {
        self.contacts
            .iter()
            .flat_map(|c| c.custom_fields_values.iter())
            .filter(|f| f.field_code.as_deref() == Some("PHONE"))
            .flat_map(|f| f.values.iter())
            .filter_map(|v| clear_phone(&value_text(&v.value)))
            .collect()
    }

    /// Earliest event timestamp.
    #[must_use]
    pub fn earliest_event_ts(&self) -> Option<i64> {
        self.events.iter().map(|e| e.created_at).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal_lead() {
        let lead: RawLead = serde_json::from_value(json!({
            "id": 42,
            "created_at": 1_696_512_000,
            "_embedded": {"tags": [{"name": "jivo"}], "loss_reason": [{"name": "SPAM"}]}
        }))
        .unwrap();

        assert_eq!(lead.id, 42);
        assert_eq!(lead.tag_names().collect::<Vec<_>>(), vec!["jivo"]);
        assert_eq!(lead.loss_reason(), Some("SPAM"));
        assert!(!lead.is_removed());
    }

    #[test]
    fn test_contact_phones_normalised() {
        let mut lead = RawLead::new(1, 0);
        lead.contacts.push(Contact {
            custom_fields_values: vec![
                CustomField::new("Phone", json!("+381 64 123-45-67")).with_code("PHONE"),
                CustomField::new("Email", json!("a@b.c")).with_code("EMAIL"),
            ],
        });

        assert_eq!(lead.contact_phones(), vec!["381641234567".to_string()]);
    }

    #[test]
    fn test_input_field() {
        let mut lead = RawLead::new(1, 0);
        lead.custom_fields_values
            .push(CustomField::new("Form", json!("https://clinic.com/form x")).with_code("INPUT"));
        assert_eq!(lead.input_field().as_deref(), Some("https://clinic.com/form x"));
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(value_text(&json!(12)), "12");
        assert_eq!(value_text(&Value::Null), "");
        assert!(value_is_truthy(&json!("x")));
        assert!(!value_is_truthy(&json!(0)));
        assert!(!value_is_truthy(&json!(false)));
    }
}
