//! Typed groups of output columns.

use chrono::NaiveDate;
use std::sync::Arc;

use super::value::FieldValue;
use crate::funnel::StageModel;

/// Latency class of one reaction measure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyBuckets {
    /// Reacted within 300 seconds.
    pub less_300: bool,
    /// Reacted after more than 300 seconds.
    pub greater_300: bool,
    /// No reaction at all.
    pub missing: bool,
}

impl LatencyBuckets {
    /// Buckets an optional latency.
    #[must_use]
    pub const fn classify(latency: Option<i64>) -> Self {
        match latency {
            None => Self {
                less_300: false,
                greater_300: false,
                missing: true,
            },
            Some(secs) if secs <= 300 => Self {
                less_300: true,
                greater_300: false,
                missing: false,
            },
            Some(_) => Self {
                less_300: false,
                greater_300: true,
                missing: false,
            },
        }
    }

    fn push(&self, row: &mut Vec<(String, FieldValue)>, prefix: &str, missing: &str, qualifier: &str) {
        row.push((format!("{prefix}{qualifier}_less_300"), self.less_300.into()));
        row.push((format!("{prefix}{qualifier}_greater_300"), self.greater_300.into()));
        row.push((format!("{missing}{qualifier}"), self.missing.into()));
    }
}

/// Reaction write-back columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionFields {
    /// Inferred origin of the lead.
    pub creation_source: String,
    /// Winning reaction channel.
    pub reaction_type: String,
    /// A successful inbound call preceded the first reaction.
    pub first_successful_incoming_call: bool,
    /// `duty time`, `off time`, or empty for deleted leads.
    pub duty_time: String,
    /// Latency when the lead arrived on duty.
    pub reaction_time_on_duty_sec: Option<i64>,
    /// Latency when the lead arrived off duty.
    pub reaction_time_off_duty_sec: Option<i64>,
    /// Any reaction, regardless of duty.
    pub reaction: LatencyBuckets,
    /// Any reaction, on duty.
    pub reaction_on_duty: LatencyBuckets,
    /// Any reaction, off duty.
    pub reaction_off_duty: LatencyBuckets,
    /// Outgoing calls only, regardless of duty.
    pub callback: LatencyBuckets,
    /// Outgoing calls only, on duty.
    pub callback_on_duty: LatencyBuckets,
    /// Outgoing calls only, off duty.
    pub callback_off_duty: LatencyBuckets,
}

impl ReactionFields {
    pub(crate) fn columns(&self) -> Vec<(String, FieldValue)> {
        let mut row = vec![
            ("creation_source".to_string(), self.creation_source.clone().into()),
            ("reaction_type".to_string(), self.reaction_type.clone().into()),
            (
                "first_successful_incoming_call".to_string(),
                self.first_successful_incoming_call.into(),
            ),
            ("duty_time".to_string(), self.duty_time.clone().into()),
            ("reaction_time_on_duty_sec".to_string(), self.reaction_time_on_duty_sec.into()),
            ("reaction_time_off_duty_sec".to_string(), self.reaction_time_off_duty_sec.into()),
        ];
        self.reaction.push(&mut row, "reaction_time", "no_reaction", "");
        self.reaction_on_duty.push(&mut row, "reaction_time", "no_reaction", "_on_duty");
        self.reaction_off_duty.push(&mut row, "reaction_time", "no_reaction", "_off_duty");
        self.callback.push(&mut row, "callback_time", "no_callback", "");
        self.callback_on_duty.push(&mut row, "callback_time", "no_callback", "_on_duty");
        self.callback_off_duty.push(&mut row, "callback_time", "no_callback", "_off_duty");
        row
    }
}

/// Interaction volume counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommunicationStats {
    /// Inbound calls of the named providers.
    pub incoming_call_attempt: u64,
    /// Summed seconds of significant inbound calls.
    pub incoming_call_duration: u64,
    /// Outbound calls of the named providers.
    pub outgoing_call_attempt: u64,
    /// Significant outbound calls.
    pub outgoing_call_quantity: u64,
    /// Summed seconds of significant outbound calls.
    pub outgoing_call_duration: u64,
    /// Inbound chat messages.
    pub incoming_chat_quantity: u64,
    /// Outbound chat messages.
    pub outgoing_chat_quantity: u64,
    /// Inbound emails.
    pub incoming_email_quantity: u64,
    /// Outbound emails.
    pub outgoing_email_quantity: u64,
}

impl CommunicationStats {
    pub(crate) fn columns(&self) -> Vec<(String, FieldValue)> {
        [
            ("incoming_call_attempt", self.incoming_call_attempt),
            ("incoming_call_duration", self.incoming_call_duration),
            ("outgoing_call_attempt", self.outgoing_call_attempt),
            ("outgoing_call_quantity", self.outgoing_call_quantity),
            ("outgoing_call_duration", self.outgoing_call_duration),
            ("incoming_chat_quantity", self.incoming_chat_quantity),
            ("outgoing_chat_quantity", self.outgoing_chat_quantity),
            ("incoming_email_quantity", self.incoming_email_quantity),
            ("outgoing_email_quantity", self.outgoing_email_quantity),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), FieldValue::count(v)))
        .collect()
    }
}

/// Per-stage output of one funnel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    /// Stage reached.
    pub reached: bool,
    /// Local date the stage was reached, when known.
    pub date: Option<NaiveDate>,
    /// Realized deal value attributed to the stage.
    pub price: Option<i64>,
    /// The lead currently sits at this stage.
    pub alive: bool,
    /// `alive × purchase_rate × price`.
    pub planned_income: Option<f64>,
    /// Realized plus planned income.
    pub planned_income_full: Option<f64>,
    /// `floor(alive × purchase_rate)`.
    pub planned_customers: Option<i64>,
}

/// Output of one funnel for one lead.
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelOutcome {
    /// The funnel the outcome is indexed by.
    pub model: Arc<StageModel>,
    /// One entry per stage, in priority order.
    pub stages: Vec<StageOutcome>,
    /// Stages the lead currently sits at.
    pub all_alive: u32,
    /// Of those, stages that count as active workload.
    pub at_work: u32,
}

impl FunnelOutcome {
    /// Creates an empty outcome for `model`.
    #[must_use]
    pub fn new(model: Arc<StageModel>) -> Self {
        let stages = vec![StageOutcome::default(); model.len()];
        Self {
            model,
            stages,
            all_alive: 0,
            at_work: 0,
        }
    }

    /// Outcome of a stage by base key.
    #[must_use]
    pub fn stage(&self, key: &str) -> Option<&StageOutcome> {
        self.model.index_of(key).and_then(|i| self.stages.get(i))
    }

    /// Reach flag of a stage by base key.
    #[must_use]
    pub fn is_reached(&self, key: &str) -> bool {
        self.stage(key).is_some_and(|s| s.reached)
    }

    pub(crate) fn columns(&self) -> Vec<(String, FieldValue)> {
        let mut row = Vec::with_capacity(self.stages.len() * 7 + 2);
        for (stage, outcome) in self.model.get_ordered_stages().iter().zip(&self.stages) {
            row.push((stage.output_key(), outcome.reached.into()));
            row.push((stage.date_key(), outcome.date.into()));
            row.push((stage.price_key(), outcome.price.into()));
            row.push((stage.alive_key(), outcome.alive.into()));
            row.push((
                stage.planned_income_key(),
                outcome.planned_income.map_or(FieldValue::Empty, FieldValue::number),
            ));
            row.push((
                stage.planned_income_full_key(),
                outcome.planned_income_full.map_or(FieldValue::Empty, FieldValue::number),
            ));
            if stage.purchase_rate > 0.0 {
                row.push((stage.planned_customers_key(), outcome.planned_customers.into()));
            }
        }
        row.push(("all_alive".to_string(), FieldValue::count(u64::from(self.all_alive))));
        row.push(("at_work".to_string(), FieldValue::count(u64::from(self.at_work))));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::Stage;

    #[test]
    fn test_latency_buckets() {
        assert!(LatencyBuckets::classify(None).missing);
        assert!(LatencyBuckets::classify(Some(300)).less_300);
        assert!(LatencyBuckets::classify(Some(0)).less_300);
        assert!(LatencyBuckets::classify(Some(301)).greater_300);
    }

    #[test]
    fn test_reaction_columns_names() {
        let fields = ReactionFields {
            reaction_on_duty: LatencyBuckets::classify(Some(250)),
            ..ReactionFields::default()
        };
        let columns = fields.columns();
        let get = |k: &str| columns.iter().find(|(n, _)| n == k).map(|(_, v)| v.clone());

        assert_eq!(get("reaction_time_on_duty_less_300"), Some(FieldValue::Int(1)));
        assert_eq!(get("no_reaction_off_duty"), Some(FieldValue::Empty));
        assert_eq!(get("no_callback"), Some(FieldValue::Empty));
        assert_eq!(get("callback_time_off_duty_greater_300"), Some(FieldValue::Empty));
        assert_eq!(columns.len(), 24);
    }

    #[test]
    fn test_funnel_columns() {
        let model = Arc::new(
            StageModel::new(
                "m",
                vec![
                    Stage::new("raw_lead", "Raw", 0),
                    Stage::new("purchase", "Purchase", 18)
                        .with_statuses(["WON"])
                        .with_purchase_rate(1.0),
                ],
            )
            .unwrap(),
        );
        let mut outcome = FunnelOutcome::new(model);
        outcome.stages[1].reached = true;
        outcome.stages[1].price = Some(5000);

        let columns = outcome.columns();
        assert!(columns.contains(&("stage_18_purchase".to_string(), FieldValue::Int(1))));
        assert!(columns.contains(&("stage_18_purchase_price".to_string(), FieldValue::Int(5000))));
        assert!(columns
            .iter()
            .any(|(k, _)| k == "stage_18_purchase_planned_customers_(rate 1)"));
        assert!(!columns
            .iter()
            .any(|(k, _)| k == "stage_00_raw_lead_planned_customers_(rate 0)"));
        assert!(outcome.is_reached("purchase"));
    }
}
