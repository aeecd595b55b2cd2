use serde::{Deserialize, Serialize};
use tracing::trace;

use super::rules::AttributionRule;
use crate::model::RawLead;

/// Custom field names (and referer query keys) mapped onto attribution names.
const UTM_MAP: [(&str, &str); 27] = [
    ("utm_source", "final_utm_source"),
    ("utm_medium", "final_utm_medium"),
    ("utm_campaign", "final_utm_campaign"),
    ("utm_term", "final_utm_term"),
    ("utm_content", "final_utm_content"),
    ("UTM_CREATIVE", "final_utm_creative"),
    ("UTM_NETWORK", "final_utm_network"),
    ("UTM_MATCH", "final_utm_match"),
    ("REFERER", "final_utm_referer"),
    ("utm_referrer", "final_utm_referer"),
    ("UTM_DEVICE", "final_utm_device"),
    ("UTM_PLACEMENT", "final_utm_placement"),
    ("UTM_TARGET", "final_utm_target"),
    ("UTM_POSITION", "final_utm_position"),
    ("utm_creative", "final_utm_creative"),
    ("source", "final_utm_source"),
    ("utm_position", "final_utm_position"),
    ("utm_network", "final_utm_network"),
    ("utm_target", "final_utm_target"),
    ("utm_placement", "final_utm_placement"),
    ("utm_match", "final_utm_match"),
    ("utm_device", "final_utm_device"),
    ("campaign_id", "final_utm_campaign"),
    ("gclid", "final_gclid"),
    ("fbclid", "final_fbclid"),
    ("referer", "final_utm_referer"),
    ("utm_referer", "final_utm_referer"),
];

/// Raw utm columns copied verbatim from identically named custom fields.
pub const RAW_UTM_KEYS: [&str; 14] = [
    "utm_creative",
    "utm_device",
    "utm_match",
    "utm_source",
    "utm_medium",
    "utm_term",
    "utm_campaign",
    "utm_placement",
    "utm_referer",
    "utm_network",
    "utm_target",
    "utm_position",
    "utm_content",
    "ym_cid",
];

/// Maps a field or query-key name to its attribution name.
#[must_use]
pub fn canonical_key(name: &str) -> Option<&'static str> {
    UTM_MAP
        .iter()
        .find(|(raw, _)| *raw == name)
        .map(|(_, canonical)| *canonical)
}

/// Resolved marketing labels of one lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// `final_utm_source`.
    pub utm_source: String,
    /// `final_utm_medium`.
    pub utm_medium: String,
    /// `final_utm_campaign`.
    pub utm_campaign: String,
    /// `final_utm_term`.
    pub utm_term: String,
    /// `final_utm_content`.
    pub utm_content: String,
    /// `final_utm_creative`.
    pub utm_creative: String,
    /// `final_utm_network`.
    pub utm_network: String,
    /// `final_utm_match`.
    pub utm_match: String,
    /// `final_utm_referer`.
    pub utm_referer: String,
    /// `final_utm_device`.
    pub utm_device: String,
    /// `final_utm_placement`.
    pub utm_placement: String,
    /// `final_utm_target`.
    pub utm_target: String,
    /// `final_utm_position`.
    pub utm_position: String,
    /// `final_gclid`.
    pub gclid: String,
    /// `final_fbclid`.
    pub fbclid: String,
    /// `final_utm_channel`, only ever set by rules.
    pub utm_channel: String,
    /// `final_base_url`: the referer without its query string.
    pub base_url: String,
    /// `final_rule_num`: numbers of the rules that fired, comma-joined.
    pub rule_num: String,
}

impl Attribution {
    /// Every attribution name except `final_rule_num`, in output order.
    pub const KEYS: [&'static str; 17] = [
        "final_utm_source",
        "final_utm_medium",
        "final_utm_campaign",
        "final_utm_term",
        "final_utm_content",
        "final_utm_creative",
        "final_utm_network",
        "final_utm_match",
        "final_utm_referer",
        "final_utm_device",
        "final_utm_placement",
        "final_utm_target",
        "final_utm_position",
        "final_gclid",
        "final_fbclid",
        "final_utm_channel",
        "final_base_url",
    ];

    /// Returns true for a name listed in [`Attribution::KEYS`].
    #[must_use]
    pub fn is_known(name: &str) -> bool {
        Self::KEYS.contains(&name)
    }

    fn slot(&self, name: &str) -> Option<&String> {
        Some(match name {
            "final_utm_source" => &self.utm_source,
            "final_utm_medium" => &self.utm_medium,
            "final_utm_campaign" => &self.utm_campaign,
            "final_utm_term" => &self.utm_term,
            "final_utm_content" => &self.utm_content,
            "final_utm_creative" => &self.utm_creative,
            "final_utm_network" => &self.utm_network,
            "final_utm_match" => &self.utm_match,
            "final_utm_referer" => &self.utm_referer,
            "final_utm_device" => &self.utm_device,
            "final_utm_placement" => &self.utm_placement,
            "final_utm_target" => &self.utm_target,
            "final_utm_position" => &self.utm_position,
            "final_gclid" => &self.gclid,
            "final_fbclid" => &self.fbclid,
            "final_utm_channel" => &self.utm_channel,
            "final_base_url" => &self.base_url,
            "final_rule_num" => &self.rule_num,
            _ => return None,
        })
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut String> {
        Some(match name {
            "final_utm_source" => &mut self.utm_source,
            "final_utm_medium" => &mut self.utm_medium,
            "final_utm_campaign" => &mut self.utm_campaign,
            "final_utm_term" => &mut self.utm_term,
            "final_utm_content" => &mut self.utm_content,
            "final_utm_creative" => &mut self.utm_creative,
            "final_utm_network" => &mut self.utm_network,
            "final_utm_match" => &mut self.utm_match,
            "final_utm_referer" => &mut self.utm_referer,
            "final_utm_device" => &mut self.utm_device,
            "final_utm_placement" => &mut self.utm_placement,
            "final_utm_target" => &mut self.utm_target,
            "final_utm_position" => &mut self.utm_position,
            "final_gclid" => &mut self.gclid,
            "final_fbclid" => &mut self.fbclid,
            "final_utm_channel" => &mut self.utm_channel,
            "final_base_url" => &mut self.base_url,
            _ => return None,
        })
    }

    /// Reads a value by its `final_*` name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.slot(name).map(String::as_str)
    }

    /// Writes a value by its `final_*` name. Returns false for unknown names.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        match self.slot_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Appends a rule number to `final_rule_num`.
    pub fn push_rule_num(&mut self, num: &str) {
        if self.rule_num.is_empty() {
            self.rule_num = num.to_string();
        } else {
            self.rule_num = format!("{}, {num}", self.rule_num);
        }
    }

    /// `(name, value)` pairs for the serialization boundary.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        Self::KEYS
            .iter()
            .chain(std::iter::once(&"final_rule_num"))
            .filter_map(|k| self.get(k).map(|v| (*k, v)))
            .collect()
    }
}

/// Computes [`Attribution`] from custom fields, tags and tenant rules.
#[derive(Debug, Clone, Default)]
pub struct AttributionResolver {
    rules: Vec<AttributionRule>,
}

impl AttributionResolver {
    /// Creates a resolver over an ordered rule list.
    #[must_use]
    pub const fn new(rules: Vec<AttributionRule>) -> Self {
        Self { rules }
    }

    /// Number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Resolves the attribution of one lead.
    #[must_use]
    pub fn resolve(&self, lead: &RawLead) -> Attribution {
        let mut attribution = Attribution::default();

        for field in &lead.custom_fields_values {
            let lower = field.field_name.to_lowercase();
            if !lower.contains("utm") && !lower.contains("referer") {
                continue;
            }
            let Some(key) = canonical_key(&field.field_name) else {
                continue;
            };
            let value = field.first_text();
            if value.is_empty() || attribution.get(key).is_some_and(|v| !v.is_empty()) {
                continue;
            }
            attribution.set(key, value);
        }

        let referer = attribution.utm_referer.clone();
        let parts: Vec<&str> = referer.split('?').collect();
        if parts.len() == 2 {
            for pair in parts[1].split('&') {
                let kv: Vec<&str> = pair.split('=').collect();
                if kv.len() != 2 {
                    continue;
                }
                let key = kv[0].replace("amp;", "");
                let canonical = canonical_key(&key)
                    .or_else(|| Attribution::KEYS.iter().copied().find(|k| *k == key));
                let Some(canonical) = canonical else {
                    continue;
                };
                if attribution.get(canonical).is_some_and(|v| !v.is_empty()) {
                    continue;
                }
                attribution.set(canonical, kv[1].to_string());
            }
        }
        if !referer.is_empty() {
            attribution.base_url = parts[0].to_string();
        }

        let tags: Vec<String> = lead.tag_names().map(str::to_lowercase).collect();
        for (position, rule) in self.rules.iter().enumerate() {
            if rule.matches(&tags, &attribution) && rule.apply(position + 1, &mut attribution) {
                trace!(lead_id = lead.id, rule = position + 1, "Attribution rule applied");
            }
        }
        attribution
    }

    /// Copies raw utm custom fields (matched by lowercase name) verbatim.
    #[must_use]
    pub fn raw_utms(lead: &RawLead) -> Vec<(String, String)> {
        let mut raw: Vec<(String, String)> = RAW_UTM_KEYS
            .iter()
            .map(|k| ((*k).to_string(), String::new()))
            .collect();
        for field in &lead.custom_fields_values {
            let lower = field.field_name.to_lowercase();
            if let Some(slot) = raw.iter_mut().find(|(k, _)| *k == lower) {
                slot.1 = field.first_text();
            }
        }
        raw
    }
}
