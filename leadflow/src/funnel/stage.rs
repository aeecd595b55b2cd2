//! Declarative funnel stages.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::ConfigError;

/// Stage keys that lead policy sets directly rather than through criteria.
pub const SYSTEM_STAGE_KEYS: [&str; 3] = ["raw_lead", "lead", "target"];

fn default_true() -> bool {
    true
}

fn default_exempt() -> Vec<String> {
    vec!["long_negotiations".to_string()]
}

/// One node of a funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stable identifier without the priority prefix.
    pub key: String,
    /// Human-readable label.
    pub display_name: String,
    /// Traversal rank; lower is earlier.
    pub priority: u32,
    /// Status labels that mean the stage is reached.
    #[serde(default)]
    pub include_stage_names: Vec<String>,
    /// Custom fields whose filled value means the stage is reached.
    #[serde(default)]
    pub include_field_names: Vec<String>,
    /// Whether leads sitting here count as active workload.
    #[serde(default = "default_true")]
    pub counts_as_active_workload: bool,
    /// Expected conversion into a purchase, `0..=1`.
    #[serde(default)]
    pub purchase_rate: f64,
    /// Drops the `stage_NN_` prefix from output keys.
    #[serde(default)]
    pub without_num: bool,
}

impl Stage {
    /// Creates a stage with no criteria.
    #[must_use]
    pub fn new(key: impl Into<String>, display_name: impl Into<String>, priority: u32) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            priority,
            include_stage_names: Vec::new(),
            include_field_names: Vec::new(),
            counts_as_active_workload: true,
            purchase_rate: 0.0,
            without_num: false,
        }
    }

    /// Sets the status labels.
    #[must_use]
    pub fn with_statuses<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_stage_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the custom field names.
    #[must_use]
    pub fn with_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_field_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the purchase rate.
    #[must_use]
    pub const fn with_purchase_rate(mut self, rate: f64) -> Self {
        self.purchase_rate = rate;
        self
    }

    /// Marks the stage as not counting toward active workload.
    #[must_use]
    pub const fn not_at_work(mut self) -> Self {
        self.counts_as_active_workload = false;
        self
    }

    /// Drops the numeric prefix from output keys.
    #[must_use]
    pub const fn without_num(mut self) -> Self {
        self.without_num = true;
        self
    }

    /// Case-insensitive membership of a status label.
    #[must_use]
    pub fn reached(&self, status_label: &str) -> bool {
        let needle = status_label.to_lowercase();
        self.include_stage_names
            .iter()
            .any(|name| name.to_lowercase() == needle)
    }

    /// Returns true if `field_name` (or its lowercase form) is an inclusion field.
    #[must_use]
    pub fn includes_field(&self, field_name: &str) -> bool {
        let lowered = field_name.to_lowercase();
        self.include_field_names
            .iter()
            .any(|name| name == field_name || *name == lowered)
    }

    /// Column holding the reached flag, e.g. `stage_04_target`.
    #[must_use]
    pub fn output_key(&self) -> String {
        if self.without_num {
            self.key.clone()
        } else {
            format!("stage_{:02}_{}", self.priority, self.key)
        }
    }

    /// Column holding the reach date.
    #[must_use]
    pub fn date_key(&self) -> String {
        format!("{}_date", self.output_key())
    }

    /// Column holding the realized price.
    #[must_use]
    pub fn price_key(&self) -> String {
        format!("{}_price", self.output_key())
    }

    /// Column holding the "currently here" flag.
    #[must_use]
    pub fn alive_key(&self) -> String {
        format!("{}_alive", self.output_key())
    }

    /// Column holding the planned income.
    #[must_use]
    pub fn planned_income_key(&self) -> String {
        format!("{}_planned_income_(rate {})", self.output_key(), self.rate_label())
    }

    /// Column holding realized plus planned income.
    #[must_use]
    pub fn planned_income_full_key(&self) -> String {
        format!("{}_planned_income_full_(rate {})", self.output_key(), self.rate_label())
    }

    /// Column holding the planned customer count.
    #[must_use]
    pub fn planned_customers_key(&self) -> String {
        format!("{}_planned_customers_(rate {})", self.output_key(), self.rate_label())
    }

    fn rate_label(&self) -> String {
        format!("{}", self.purchase_rate)
    }

    fn has_criteria(&self) -> bool {
        !self.include_stage_names.is_empty() || !self.include_field_names.is_empty()
    }
}

/// An ordered funnel for one tenant vertical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StageModelSpec", into = "StageModelSpec")]
pub struct StageModel {
    name: String,
    stages: Vec<Stage>,
    exempt: Vec<String>,
}

/// Serialized shape of a [`StageModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageModelSpec {
    /// Funnel name.
    pub name: String,
    /// Stages in any order.
    pub stages: Vec<Stage>,
    /// Stage keys excluded from back-fill.
    #[serde(default = "default_exempt")]
    pub exempt: Vec<String>,
}

impl TryFrom<StageModelSpec> for StageModel {
    type Error = ConfigError;

    fn try_from(spec: StageModelSpec) -> Result<Self, Self::Error> {
        Self::with_exempt(spec.name, spec.stages, spec.exempt)
    }
}

impl From<StageModel> for StageModelSpec {
    fn from(model: StageModel) -> Self {
        Self {
            name: model.name,
            stages: model.stages,
            exempt: model.exempt,
        }
    }
}

impl StageModel {
    /// Builds and validates a funnel with the default exemption set.
    ///
    /// # Errors
    ///
    /// See [`StageModel::with_exempt`].
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        Self::with_exempt(name, stages, default_exempt())
    }

    /// Builds and validates a funnel.
    ///
    /// # Errors
    ///
    /// Fails on an empty funnel, duplicate keys or priorities, purchase rates
    /// outside `0..=1`, or a non-root stage without any criteria.
    pub fn with_exempt(
        name: impl Into<String>,
        mut stages: Vec<Stage>,
        exempt: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if stages.is_empty() {
            return Err(ConfigError::EmptyFunnel { model: name });
        }
        stages.sort_by_key(|s| s.priority);

        for pair in stages.windows(2) {
            if pair[0].priority == pair[1].priority {
                return Err(ConfigError::DuplicatePriority {
                    model: name,
                    priority: pair[0].priority,
                    first: pair[0].key.clone(),
                    second: pair[1].key.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.key.as_str()) {
                return Err(ConfigError::DuplicateStageKey {
                    model: name,
                    key: stage.key.clone(),
                });
            }
            if !(0.0..=1.0).contains(&stage.purchase_rate) {
                return Err(ConfigError::InvalidPurchaseRate {
                    stage: stage.key.clone(),
                    rate: stage.purchase_rate.to_string(),
                });
            }
        }

        for stage in stages.iter().skip(1) {
            if !stage.has_criteria() && !SYSTEM_STAGE_KEYS.contains(&stage.key.as_str()) {
                return Err(ConfigError::MissingCriteria {
                    model: name,
                    stage: stage.key.clone(),
                });
            }
        }

        Ok(Self { name, stages, exempt })
    }

    /// Funnel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in ascending priority.
    #[must_use]
    pub fn get_ordered_stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a validated model.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// First stage, in priority order, whose status labels contain `label`.
    ///
    /// Matching is exact, as status-history labels come straight from the
    /// pipeline dictionary.
    #[must_use]
    pub fn get_stage_for_status(&self, label: &str) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.include_stage_names.iter().any(|n| n == label))
    }

    /// Position of `label`'s stage, see [`StageModel::get_stage_for_status`].
    #[must_use]
    pub fn index_for_status(&self, label: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.include_stage_names.iter().any(|n| n == label))
    }

    /// Looks up a stage by its base key.
    #[must_use]
    pub fn stage(&self, key: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.key == key)
    }

    /// Position of a stage by its base key.
    #[must_use]
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.key == key)
    }

    /// Returns true if the stage at `index` is excluded from back-fill.
    #[must_use]
    pub fn is_exempt(&self, index: usize) -> bool {
        self.stages
            .get(index)
            .is_some_and(|s| self.exempt.iter().any(|e| *e == s.key))
    }

    /// Marks every earlier non-exempt stage reached when a later one is.
    ///
    /// `reached` is indexed like [`StageModel::get_ordered_stages`].
    pub fn backfill(&self, reached: &mut [bool]) {
        let len = reached.len().min(self.stages.len());
        let Some(highest) = (0..len)
            .rev()
            .find(|&i| reached[i] && !self.is_exempt(i))
        else {
            return;
        };
        for (i, flag) in reached.iter_mut().enumerate().take(highest) {
            if !self.is_exempt(i) {
                *flag = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_model() -> StageModel {
        StageModel::new(
            "sample",
            vec![
                Stage::new("qualification", "Qual", 3).with_statuses(["3. QUALIFIED"]),
                Stage::new("raw_lead", "Raw", 0),
                Stage::new("lead", "Lead", 1).with_statuses(["НОВЫЕ ЗАЯВКИ"]),
                Stage::new("long_negotiations", "Long", 2).with_statuses(["LONG"]),
                Stage::new("purchase", "Purchase", 4)
                    .with_statuses(["Успешно реализовано"])
                    .with_purchase_rate(1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_stages_sorted_by_priority() {
        let model = sample_model();
        let keys: Vec<_> = model.get_ordered_stages().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["raw_lead", "lead", "long_negotiations", "qualification", "purchase"]);
    }

    #[test]
    fn test_reached_is_case_insensitive() {
        let stage = Stage::new("lead", "Lead", 1).with_statuses(["НОВЫЕ ЗАЯВКИ"]);
        assert!(stage.reached("новые заявки"));
        assert!(!stage.reached("other"));
    }

    #[test]
    fn test_output_keys() {
        let stage = Stage::new("treatment_discussion", "Discussion", 10).with_purchase_rate(0.12);
        assert_eq!(stage.output_key(), "stage_10_treatment_discussion");
        assert_eq!(stage.date_key(), "stage_10_treatment_discussion_date");
        assert_eq!(
            stage.planned_income_key(),
            "stage_10_treatment_discussion_planned_income_(rate 0.12)"
        );

        let target = Stage::new("target", "Target", 4);
        assert_eq!(target.output_key(), "stage_04_target");
        assert_eq!(target.planned_customers_key(), "stage_04_target_planned_customers_(rate 0)");

        let flat = Stage::new("purchase", "Purchase", 18).with_purchase_rate(1.0).without_num();
        assert_eq!(flat.output_key(), "purchase");
        assert_eq!(flat.planned_income_full_key(), "purchase_planned_income_full_(rate 1)");
    }

    #[test]
    fn test_get_stage_for_status_first_match() {
        let model = StageModel::new(
            "dup",
            vec![
                Stage::new("raw_lead", "Raw", 0),
                Stage::new("a", "A", 1).with_statuses(["X"]),
                Stage::new("b", "B", 2).with_statuses(["X"]),
            ],
        )
        .unwrap();
        assert_eq!(model.get_stage_for_status("X").map(|s| s.key.as_str()), Some("a"));
        assert!(model.get_stage_for_status("Y").is_none());
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let err = StageModel::new(
            "bad",
            vec![
                Stage::new("raw_lead", "Raw", 0),
                Stage::new("a", "A", 1).with_statuses(["X"]),
                Stage::new("b", "B", 1).with_statuses(["Y"]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePriority { priority: 1, .. }));
    }

    #[test]
    fn test_missing_criteria_rejected() {
        let err = StageModel::new(
            "bad",
            vec![Stage::new("raw_lead", "Raw", 0), Stage::new("orphan", "Orphan", 1)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCriteria {
                model: "bad".to_string(),
                stage: "orphan".to_string()
            }
        );
    }

    #[test]
    fn test_empty_funnel_rejected() {
        assert!(matches!(
            StageModel::new("none", Vec::new()),
            Err(ConfigError::EmptyFunnel { .. })
        ));
    }

    #[test]
    fn test_backfill_skips_exempt() {
        let model = sample_model();
        let mut reached = vec![false, false, false, false, true];
        model.backfill(&mut reached);
        assert_eq!(reached, vec![true, true, false, true, true]);
    }

    #[test]
    fn test_backfill_exempt_stage_does_not_propagate() {
        let model = sample_model();
        let mut reached = vec![false, false, true, false, false];
        model.backfill(&mut reached);
        assert_eq!(reached, vec![false, false, true, false, false]);
    }

    #[test]
    fn test_backfill_monotonic_for_every_prefix() {
        let model = sample_model();
        for top in 0..model.len() {
            let mut reached = vec![false; model.len()];
            reached[top] = true;
            model.backfill(&mut reached);
            for i in 0..top {
                if !model.is_exempt(i) && !model.is_exempt(top) {
                    assert!(reached[i], "stage {i} should be reached when {top} is");
                }
            }
        }
    }

    #[test]
    fn test_model_roundtrips_through_json() {
        let json = serde_json::json!({
            "name": "json",
            "stages": [
                {"key": "raw_lead", "display_name": "Raw", "priority": 0},
                {"key": "lead", "display_name": "Lead", "priority": 1, "include_stage_names": ["NEW"]}
            ]
        });
        let model: StageModel = serde_json::from_value(json).unwrap();
        assert_eq!(model.len(), 2);
        assert!(model.stage("lead").unwrap().counts_as_active_workload);

        let bad = serde_json::json!({"name": "x", "stages": []});
        assert!(serde_json::from_value::<StageModel>(bad).is_err());
    }
}
