//! Declarative output columns.

use serde::{Deserialize, Serialize};

/// One tenant-declared output column.
///
/// A column is filled from a CRM custom field (`custom_field_source`) or
/// copied from a raw lead attribute (`is_raw`). Date columns hold epoch
/// seconds in the CRM and are cast to tenant-local dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Output key.
    pub key: String,
    /// Human-readable column title.
    pub display_name: String,
    /// Epoch values are cast to local dates.
    #[serde(default)]
    pub is_date: bool,
    /// Copied from the raw lead attribute named `key`.
    #[serde(default)]
    pub is_raw: bool,
    /// CRM custom field the value is read from.
    #[serde(default)]
    pub custom_field_source: Option<String>,
    /// Any filled value becomes `1`, an unfilled one `0`.
    #[serde(default)]
    pub as_flag: bool,
}

impl FieldSpec {
    /// A derived column with no source.
    #[must_use]
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            is_date: false,
            is_raw: false,
            custom_field_source: None,
            as_flag: false,
        }
    }

    /// A column read from a custom field.
    #[must_use]
    pub fn custom(
        key: impl Into<String>,
        display_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            custom_field_source: Some(source.into()),
            ..Self::new(key, display_name)
        }
    }

    /// Marks the column as a date.
    #[must_use]
    pub const fn date(mut self) -> Self {
        self.is_date = true;
        self
    }

    /// Marks the column as a raw attribute copy.
    #[must_use]
    pub const fn raw(mut self) -> Self {
        self.is_raw = true;
        self
    }

    /// Renders the column as a 1/0 flag.
    #[must_use]
    pub const fn flag(mut self) -> Self {
        self.as_flag = true;
        self
    }
}
