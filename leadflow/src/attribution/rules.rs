//! Tenant rules that rewrite resolved attribution labels.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Attribution;
use crate::model::value_text;

/// One `term_N` / `value_N` condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTerm {
    /// `tag` or an attribution name without the `final_` prefix.
    pub field: String,
    /// Lowercased pattern: `*x*` contains, `!=x` differs, otherwise equals.
    pub value: String,
}

impl RuleTerm {
    fn matches(&self, tags: &[String], attribution: &Attribution) -> bool {
        if self.field == "tag" {
            if self.value.contains('*') {
                let needle = self.value.replace('*', "");
                let needle = needle.trim();
                tags.iter().any(|t| t.contains(needle))
            } else if self.value.contains("!=") {
                let needle = self.value.replace("!=", "");
                let needle = needle.trim();
                tags.iter().any(|t| t != needle)
            } else {
                tags.iter().any(|t| *t == self.value)
            }
        } else {
            // Unknown or unset names read as empty.
            let resolved = attribution
                .get(&format!("final_{}", self.field))
                .unwrap_or_default()
                .to_lowercase();
            if self.value.contains('*') {
                let needle = self.value.replace('*', "");
                resolved.contains(needle.trim())
            } else if self.value.contains("!=") {
                let needle = self.value.replace("!=", "");
                resolved != needle.trim()
            } else {
                resolved == self.value
            }
        }
    }
}

/// A row of the tenant's attribution rule sheet.
///
/// Rows are loose key/value maps; anything unusable is ignored rather than
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct AttributionRule {
    /// Conditions, all of which must hold.
    pub terms: Vec<RuleTerm>,
    /// Attribution name to overwrite, without `final_`.
    pub result_field: String,
    /// Literal value, or the name of another attribution to copy.
    pub result_value: String,
    /// Explicit rule number reported instead of the position.
    pub num: Option<String>,
}

impl AttributionRule {
    /// Creates a rule with no terms.
    #[must_use]
    pub fn new(result_field: impl Into<String>, result_value: impl Into<String>) -> Self {
        Self {
            terms: Vec::new(),
            result_field: result_field.into(),
            result_value: result_value.into(),
            num: None,
        }
    }

    /// Adds a condition. A repeated field replaces the earlier pattern.
    #[must_use]
    pub fn with_term(mut self, field: impl Into<String>, value: &str) -> Self {
        self.push_term(field.into(), value.to_lowercase());
        self
    }

    /// Sets the reported rule number.
    #[must_use]
    pub fn with_num(mut self, num: impl Into<String>) -> Self {
        self.num = Some(num.into());
        self
    }

    fn push_term(&mut self, field: String, value: String) {
        if let Some(existing) = self.terms.iter_mut().find(|t| t.field == field) {
            existing.value = value;
        } else {
            self.terms.push(RuleTerm { field, value });
        }
    }

    /// Returns true when the rule has terms and every one holds.
    #[must_use]
    pub fn matches(&self, tags: &[String], attribution: &Attribution) -> bool {
        !self.terms.is_empty() && self.terms.iter().all(|t| t.matches(tags, attribution))
    }

    /// Writes the result into `attribution` and records the rule number.
    ///
    /// Returns false when the target field is unknown or the value is empty.
    pub fn apply(&self, position: usize, attribution: &mut Attribution) -> bool {
        let referenced = format!("final_{}", self.result_value);
        let value = if Attribution::is_known(&referenced) {
            attribution.get(&referenced).unwrap_or_default().to_string()
        } else {
            self.result_value.clone()
        };
        let target = format!("final_{}", self.result_field);
        if self.result_field.is_empty() || value.is_empty() || !Attribution::is_known(&target) {
            return false;
        }
        attribution.set(&target, value);
        let num = self.num.clone().unwrap_or_else(|| position.to_string());
        attribution.push_rule_num(&num);
        true
    }
}

impl From<Map<String, Value>> for AttributionRule {
    fn from(row: Map<String, Value>) -> Self {
        let text = |key: &str| row.get(key).map(value_text).unwrap_or_default();
        let mut rule = Self::new(text("result_field"), text("result_value"));
        let num = text("num");
        if !num.is_empty() {
            rule.num = Some(num);
        }
        for n in 1.. {
            let term_key = format!("term_{n}");
            let Some(term) = row.get(&term_key) else {
                break;
            };
            let field = value_text(term);
            if field.is_empty() {
                continue;
            }
            rule.push_term(field, text(&format!("value_{n}")).to_lowercase());
        }
        rule
    }
}

impl From<AttributionRule> for Map<String, Value> {
    fn from(rule: AttributionRule) -> Self {
        let mut row = Self::new();
        for (n, term) in rule.terms.into_iter().enumerate() {
            row.insert(format!("term_{}", n + 1), Value::String(term.field));
            row.insert(format!("value_{}", n + 1), Value::String(term.value));
        }
        row.insert("result_field".to_string(), Value::String(rule.result_field));
        row.insert("result_value".to_string(), Value::String(rule.result_value));
        if let Some(num) = rule.num {
            row.insert("num".to_string(), Value::String(num));
        }
        row
    }
}
