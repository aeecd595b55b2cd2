//! Custom-field resolution: declared columns, country and offer speed.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{value_is_truthy, value_text, CustomField, RawLead};
use crate::record::FieldValue;
use crate::tenant::{CountryConfig, FieldSpec, OfferSpeedRule};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Epoch seconds carried by a custom value, zero treated as unset.
pub(crate) fn epoch_of(value: &Value) -> Option<i64> {
    let ts = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (ts != 0).then_some(ts)
}

fn scalar(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Empty,
        Value::Bool(b) => FieldValue::Int(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(FieldValue::Int)
            .or_else(|| n.as_f64().map(FieldValue::Float))
            .unwrap_or_default(),
        other => value_text(other).into(),
    }
}

/// Output cell for a custom field under a column spec.
///
/// Flags become `1`/`0`, booleans `1`/`0`, several values are joined with
/// `, `. Date columns keep the raw epoch; they are cast later.
pub(crate) fn cell(field: &CustomField, spec: &FieldSpec) -> FieldValue {
    if spec.as_flag {
        return FieldValue::Int(i64::from(value_is_truthy(field.first())));
    }
    if spec.is_date {
        return epoch_of(field.first()).map_or(FieldValue::Empty, FieldValue::Int);
    }
    let values: Vec<&Value> = field
        .values
        .iter()
        .map(|v| &v.value)
        .filter(|v| !v.is_null())
        .collect();
    match values.as_slice() {
        [] => FieldValue::Empty,
        [single] => scalar(single),
        many => many
            .iter()
            .map(|v| value_text(v))
            .collect::<Vec<_>>()
            .join(", ")
            .into(),
    }
}

/// What one pass over a lead's custom fields produced.
#[derive(Debug, Default)]
pub(crate) struct CustomFieldValues {
    pub columns: BTreeMap<String, FieldValue>,
    pub country: String,
    pub offer_speed: Option<(String, i64)>,
}

/// Walks the lead's custom fields in CRM order.
pub(crate) fn resolve_custom_fields(
    lead: &RawLead,
    specs: &[FieldSpec],
    country: &CountryConfig,
    offer: Option<&OfferSpeedRule>,
) -> CustomFieldValues {
    let by_source: BTreeMap<&str, &FieldSpec> = specs
        .iter()
        .filter_map(|s| s.custom_field_source.as_deref().map(|src| (src, s)))
        .collect();

    let mut out = CustomFieldValues::default();
    let mut candidates: Vec<String> = Vec::new();
    let mut offer_from: Option<i64> = None;

    for field in &lead.custom_fields_values {
        let name = field.field_name.as_str();

        if let Some(rule) = offer {
            if name == rule.from_field {
                offer_from = epoch_of(field.first());
            }
            if name == rule.to_field {
                if let (Some(from), Some(to)) = (offer_from, epoch_of(field.first())) {
                    out.offer_speed = Some((rule.key.clone(), offer_days(from, to, rule.cap_days)));
                }
            }
        }

        if country.primary_field.as_deref() == Some(name) {
            out.country = field.first_text();
            continue;
        }
        if let Some(spec) = by_source.get(name) {
            out.columns.insert(spec.key.clone(), cell(field, spec));
            continue;
        }
        if country.candidate_fields.iter().any(|c| c == name) {
            let value = field.first_text();
            if CountryConfig::accepts_candidate(&value) {
                candidates.push(value);
            }
        }
    }

    if out.country.is_empty() {
        out.country = candidates
            .into_iter()
            .next()
            .or_else(|| contact_country(lead, country))
            .unwrap_or_default();
    }
    out.country = country.clean(&out.country);
    out
}

fn contact_country(lead: &RawLead, country: &CountryConfig) -> Option<String> {
    lead.contacts
        .iter()
        .flat_map(|c| c.custom_fields_values.iter())
        .filter(|f| country.contact_fields.iter().any(|n| *n == f.field_name))
        .map(CustomField::first_text)
        .find(|v| !v.is_empty())
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn offer_days(from: i64, to: i64, cap: i64) -> i64 {
    let days = ((to - from) as f64 / SECONDS_PER_DAY).round_ties_even() as i64;
    days.min(cap)
}
