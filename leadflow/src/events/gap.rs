//! Data-gap diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a missing or malformed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataGapKind {
    /// A status-change event references a pipeline missing from the directory.
    UnknownPipeline,
    /// A status id is missing from its pipeline.
    UnknownStatus,
    /// A user id is missing from the user directory.
    UnknownUser,
    /// A provider sent a call duration that is not a number.
    MalformedCallDuration,
    /// No creation source could be inferred.
    MissingCreationSource,
    /// The lead has no events, notes or tasks.
    EmptyTimeline,
}

impl DataGapKind {
    /// Stable dotted name used as the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownPipeline => "data_gap.unknown_pipeline",
            Self::UnknownStatus => "data_gap.unknown_status",
            Self::UnknownUser => "data_gap.unknown_user",
            Self::MalformedCallDuration => "data_gap.malformed_call_duration",
            Self::MissingCreationSource => "data_gap.missing_creation_source",
            Self::EmptyTimeline => "data_gap.empty_timeline",
        }
    }
}

impl fmt::Display for DataGapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal input problem, resolved to an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGap {
    /// Lead the gap belongs to.
    pub lead_id: i64,
    /// Category.
    pub kind: DataGapKind,
    /// Free-form detail, e.g. the missing id.
    pub detail: String,
}

impl DataGap {
    /// Creates a gap record.
    #[must_use]
    pub fn new(lead_id: i64, kind: DataGapKind, detail: impl Into<String>) -> Self {
        Self {
            lead_id,
            kind,
            detail: detail.into(),
        }
    }

    /// Converts the gap to a JSON payload.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "lead_id": self.lead_id,
            "kind": self.kind,
            "detail": self.detail,
        })
    }
}
