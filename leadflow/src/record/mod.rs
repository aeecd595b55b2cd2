//! Output records and their serialization boundary.
//!
//! [`OutputRecord`] is the typed per-lead result. [`Row`] is the flat,
//! ordered key/value view handed to exporters: `id` first, every other
//! column sorted by name, empty values rendered as `""`.

mod fields;
mod value;

pub use fields::{
    CommunicationStats, FunnelOutcome, LatencyBuckets, ReactionFields, StageOutcome,
};
pub use value::FieldValue;

use chrono::NaiveDate;
use serde::ser::{Serialize, SerializeMap, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::attribution::Attribution;
use crate::funnel::Resurrection;

/// One flat output line per lead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRecord {
    /// Source-assigned lead id.
    pub id: i64,
    /// Lead title.
    pub name: String,
    /// Deal value.
    pub price: Option<i64>,
    /// Local creation date.
    pub created_at: NaiveDate,
    /// Local creation hour.
    pub created_at_hour: u32,
    /// Local date of the last update.
    pub updated_at: Option<NaiveDate>,
    /// Local closing date.
    pub closed_at: Option<NaiveDate>,
    /// Current pipeline name.
    pub pipeline_name: String,
    /// Current status label.
    pub status_name: String,
    /// Owner name.
    pub responsible_user_name: String,
    /// Owner group.
    pub responsible_group: String,
    /// Normalised loss reason (`active`, `closed with no reason`, ...).
    pub loss_reason: String,
    /// Link to the lead in the CRM.
    pub link: String,
    /// Tag names joined with `, `.
    pub tags: String,
    /// Any tag mentions jivo.
    pub jivo: bool,
    /// Capture-form payload.
    pub input_field: String,
    /// The lead was deleted.
    pub deleted: bool,
    /// Who deleted it.
    pub deleted_by: String,
    /// Country after normalisation and phone inference.
    pub country: String,
    /// Normalised contact phones.
    pub phone: Vec<String>,
    /// Loss reason qualifies the record as a lead.
    pub is_lead: bool,
    /// Lead with a target-qualifying loss reason.
    pub is_target: bool,
    /// Resolved attribution.
    pub attribution: Attribution,
    /// Raw utm columns.
    pub raw_utm: Vec<(String, String)>,
    /// Tenant-declared custom and derived columns.
    pub fields: BTreeMap<String, FieldValue>,
    /// One outcome per tenant funnel.
    pub funnels: Vec<FunnelOutcome>,
    /// Active workload in any funnel.
    pub at_work_any_pipeline: bool,
    /// Lost, revived, then won.
    pub resurrection: Option<Resurrection>,
    /// First reached stage of the tenant's purchase fallback chain.
    pub purchase_extended: bool,
    /// Price of that stage.
    pub purchase_extended_price: Option<i64>,
    /// Reaction write-back.
    pub reaction: ReactionFields,
    /// Interaction volumes, when enabled.
    pub communication: Option<CommunicationStats>,
    /// Creation time looks shifted relative to the event history.
    pub created_at_offset: bool,
}

impl OutputRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new(id: i64, created_at: NaiveDate) -> Self {
        Self {
            id,
            created_at,
            ..Self::default()
        }
    }

    /// Outcome of a funnel by model name.
    #[must_use]
    pub fn funnel(&self, model: &str) -> Option<&FunnelOutcome> {
        self.funnels.iter().find(|f| f.model.name() == model)
    }

    /// A tenant column by key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Flattens the record.
    #[must_use]
    pub fn to_row(&self) -> Row {
        let mut columns: BTreeMap<String, FieldValue> = BTreeMap::new();
        let mut put = |key: &str, value: FieldValue| {
            columns.insert(key.to_string(), value);
        };

        put("name", self.name.clone().into());
        put("price", self.price.into());
        put("created_at", self.created_at.into());
        put("created_at_hour", self.created_at_hour.into());
        put("updated_at", self.updated_at.into());
        put("closed_at", self.closed_at.into());
        put("pipeline_name", self.pipeline_name.clone().into());
        put("status_name", self.status_name.clone().into());
        put("responsible_user_name", self.responsible_user_name.clone().into());
        put("responsible_group", self.responsible_group.clone().into());
        put("loss_reason", self.loss_reason.clone().into());
        put("link_to_amo", self.link.clone().into());
        put("tags", self.tags.clone().into());
        put("jivo", self.jivo.into());
        put("input_field", self.input_field.clone().into());
        put("deleted_leads", self.deleted.into());
        put("deleted_by", self.deleted_by.clone().into());
        put("country", self.country.clone().into());
        put("phone", FieldValue::List(self.phone.clone()));
        put("at_work_any_pipeline", self.at_work_any_pipeline.into());
        put("purchase_extended", self.purchase_extended.into());
        put("purchase_extended_price", self.purchase_extended_price.into());
        put("created_at_offset", self.created_at_offset.into());
        put("date_unrealized", self.resurrection.map(|r| r.unrealized).into());
        put("date_reanimated", self.resurrection.map(|r| r.reanimated).into());
        put(
            "date_realized_after_reanimation",
            self.resurrection.map(|r| r.realized).into(),
        );

        for (key, value) in self.attribution.pairs() {
            put(key, value.into());
        }
        for (key, value) in &self.raw_utm {
            put(key, value.as_str().into());
        }
        for funnel in &self.funnels {
            for (key, value) in funnel.columns() {
                put(&key, value);
            }
        }
        for (key, value) in self.reaction.columns() {
            put(&key, value);
        }
        if let Some(stats) = &self.communication {
            for (key, value) in stats.columns() {
                put(&key, value);
            }
        }
        for (key, value) in &self.fields {
            put(key, value.clone());
        }

        Row::new(self.id, columns)
    }

    /// SHA-256 over the serialized row, hex-encoded.
    ///
    /// Equal inputs give equal fingerprints, so exporters can skip unchanged
    /// records.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.to_row()).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// Ordered column view of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<(String, FieldValue)>,
}

impl Row {
    /// `id` first, then `columns` in key order.
    #[must_use]
    pub fn new(id: i64, columns: BTreeMap<String, FieldValue>) -> Self {
        let mut ordered = Vec::with_capacity(columns.len() + 1);
        ordered.push(("id".to_string(), FieldValue::Int(id)));
        ordered.extend(columns.into_iter().filter(|(k, _)| k != "id"));
        Self { columns: ordered }
    }

    /// Looks up a column.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.columns.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Column names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(k, _)| k.as_str())
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Never true; a row always has `id`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Consumes the row.
    #[must_use]
    pub fn into_columns(self) -> Vec<(String, FieldValue)> {
        self.columns
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (key, value) in &self.columns {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> OutputRecord {
        let mut record = OutputRecord::new(42, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        record.name = "Lead".to_string();
        record.price = Some(1000);
        record.phone = vec!["381641234567".to_string()];
        record.fields.insert("clinic".to_string(), FieldValue::from("Belgrade"));
        record.attribution.utm_source = "google".to_string();
        record
    }

    #[test]
    fn test_row_id_first_then_sorted() {
        let row = sample().to_row();
        let keys: Vec<_> = row.keys().collect();

        assert_eq!(keys[0], "id");
        let mut rest = keys[1..].to_vec();
        rest.sort_unstable();
        assert_eq!(rest, keys[1..].to_vec());
        assert_eq!(row.get("final_utm_source"), Some(&FieldValue::from("google")));
        assert_eq!(row.get("clinic"), Some(&FieldValue::from("Belgrade")));
        assert_eq!(row.get("closed_at"), Some(&FieldValue::Empty));
    }

    #[test]
    fn test_row_serializes_empty_as_string() {
        let json = serde_json::to_value(sample().to_row()).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["created_at"], "2024-03-04");
        assert_eq!(json["deleted_by"], "");
        assert_eq!(json["phone"][0], "381641234567");
    }

    #[test]
    fn test_fingerprint_stable() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        b.country = "Serbia".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
