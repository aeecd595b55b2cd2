//! Per-tenant configuration as plain serde data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::fields::FieldSpec;
use crate::attribution::AttributionRule;
use crate::errors::{ConfigError, LeadflowError};
use crate::funnel::{StageModel, StatusLabels};
use crate::reaction::DutySchedule;
use crate::utils::DialingCodes;

fn default_junk() -> Vec<String> {
    ["-", "yeah", "yes", "yes!", "alqouz1", "false"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Where the country column comes from and how it is cleaned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryConfig {
    /// Custom field copied as-is when filled.
    #[serde(default)]
    pub primary_field: Option<String>,
    /// Further custom fields, in priority order. Numeric values and values
    /// containing `.` or `:` are rejected.
    #[serde(default)]
    pub candidate_fields: Vec<String>,
    /// Contact-level fields used when the lead has none.
    #[serde(default)]
    pub contact_fields: Vec<String>,
    /// Lowercase values that mean "no country".
    #[serde(default = "default_junk")]
    pub junk: Vec<String>,
    /// Spelling fixes applied after cleaning.
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
    /// Prefix table for the phone-based fallback.
    #[serde(default)]
    pub dialing_codes: DialingCodes,
}

impl Default for CountryConfig {
    fn default() -> Self {
        Self {
            primary_field: None,
            candidate_fields: Vec::new(),
            contact_fields: Vec::new(),
            junk: default_junk(),
            replacements: BTreeMap::new(),
            dialing_codes: DialingCodes::default(),
        }
    }
}

impl CountryConfig {
    /// Cleans a raw country value.
    ///
    /// Values with `.` or `:` and junk words are blanked, purely numeric
    /// values are kept untouched, anything else goes through the
    /// replacement table.
    #[must_use]
    pub fn clean(&self, raw: &str) -> String {
        let lowered = raw.to_lowercase();
        if raw.contains('.') || raw.contains(':') || self.junk.iter().any(|j| *j == lowered) {
            return String::new();
        }
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            return raw.to_string();
        }
        self.replacements
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    /// Returns true if a candidate value may be used as a country.
    #[must_use]
    pub fn accepts_candidate(value: &str) -> bool {
        let numeric = !value.is_empty() && value.chars().all(|c| c.is_ascii_digit());
        !numeric && !value.contains(':') && !value.contains('.')
    }
}

/// Flags leads whose milestone date falls within `days` of creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneWindow {
    /// Output key of the flag.
    pub key: String,
    /// Date column the milestone is read from.
    pub date_field: String,
    /// Inclusive window length in days.
    pub days: i64,
    /// Pipelines the window applies to; empty means all.
    #[serde(default)]
    pub pipelines: Vec<String>,
}

impl MilestoneWindow {
    /// Creates a window applying to every pipeline.
    #[must_use]
    pub fn new(key: impl Into<String>, date_field: impl Into<String>, days: i64) -> Self {
        Self {
            key: key.into(),
            date_field: date_field.into(),
            days,
            pipelines: Vec::new(),
        }
    }

    /// Restricts the window to the named pipelines.
    #[must_use]
    pub fn for_pipelines<I, S>(mut self, pipelines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipelines = pipelines.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the window applies to `pipeline`.
    #[must_use]
    pub fn applies_to(&self, pipeline: &str) -> bool {
        self.pipelines.is_empty() || self.pipelines.iter().any(|p| p == pipeline)
    }
}

/// Days between two date custom fields, rounded and capped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSpeedRule {
    /// Output key.
    pub key: String,
    /// Custom field holding the start date. Must precede `to_field` on the lead.
    pub from_field: String,
    /// Custom field holding the end date.
    pub to_field: String,
    /// Upper bound in days.
    pub cap_days: i64,
}

/// Everything that distinguishes one CRM account from another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Registry identifier.
    pub name: String,
    /// CRM subdomain, used for lead links.
    pub subdomain: String,
    /// Tenant UTC offset in hours.
    #[serde(default)]
    pub utc_offset_hours: i32,
    /// Funnels, the first being the primary one.
    pub models: Vec<StageModel>,
    /// Declared output columns.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Loss reasons that disqualify a lead.
    #[serde(default)]
    pub not_lead_loss_reasons: Vec<String>,
    /// Loss reasons that still count as target.
    #[serde(default)]
    pub target_loss_reasons: Vec<String>,
    /// Ordered attribution rules.
    #[serde(default)]
    pub attribution_rules: Vec<AttributionRule>,
    /// Working hours; absent means always off duty.
    #[serde(default)]
    pub schedule: Option<DutySchedule>,
    /// Status labels with fixed meaning.
    #[serde(default)]
    pub status_labels: StatusLabels,
    /// Country column settings.
    #[serde(default)]
    pub country: CountryConfig,
    /// Milestone flags.
    #[serde(default)]
    pub milestones: Vec<MilestoneWindow>,
    /// Offer speed column.
    #[serde(default)]
    pub offer_speed: Option<OfferSpeedRule>,
    /// Stage keys of the primary funnel tried in order for `purchase_extended`.
    #[serde(default)]
    pub purchase_chain: Vec<String>,
    /// Emit `duration_30_days` for closed leads.
    #[serde(default)]
    pub duration_30_days: bool,
    /// Mark stages from status history too.
    #[serde(default)]
    pub check_by_stages: bool,
    /// Date columns aligned to Monday in weekly runs.
    #[serde(default)]
    pub weekly_date_fields: Vec<String>,
}

impl TenantConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or invalid funnels
    /// and schedules, and any [`TenantConfig::validate`] failure.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, otherwise see
    /// [`TenantConfig::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LeadflowError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&raw)?)
    }

    /// Looks up a declared column.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Checks cross-references between the sections.
    ///
    /// # Errors
    ///
    /// Fails when no funnel is defined, when the purchase chain names a
    /// stage the primary funnel lacks, or when milestone, offer-speed or
    /// weekly settings reference undeclared date columns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(primary) = self.models.first() else {
            return Err(ConfigError::NoFunnels(self.name.clone()));
        };
        for key in &self.purchase_chain {
            if primary.stage(key).is_none() {
                return Err(ConfigError::UnknownStage {
                    key: key.clone(),
                    context: "purchase_chain".to_string(),
                });
            }
        }
        let require_date = |key: &str, context: &str| -> Result<(), ConfigError> {
            match self.field(key) {
                Some(spec) if spec.is_date => Ok(()),
                _ => Err(ConfigError::UnknownField {
                    key: key.to_string(),
                    context: context.to_string(),
                }),
            }
        };
        for window in &self.milestones {
            require_date(&window.date_field, &format!("milestone '{}'", window.key))?;
        }
        for key in &self.weekly_date_fields {
            require_date(key, "weekly_date_fields")?;
        }
        if let Some(rule) = &self.offer_speed {
            if rule.cap_days < 0 {
                return Err(ConfigError::Parse(format!(
                    "offer speed cap for '{}' is negative",
                    rule.key
                )));
            }
        }
        Ok(())
    }
}
