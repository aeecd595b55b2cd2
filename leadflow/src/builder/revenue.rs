//! Per-stage money, workload and milestone columns.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::record::{FieldValue, FunnelOutcome};
use crate::tenant::MilestoneWindow;

/// Marks stages the current status sits at and counts active workload.
///
/// Returns true if any stage of the funnel is active workload.
pub(crate) fn mark_alive(outcome: &mut FunnelOutcome, status_name: &str) -> bool {
    outcome.all_alive = 0;
    outcome.at_work = 0;
    let model = std::sync::Arc::clone(&outcome.model);
    for (stage, slot) in model.get_ordered_stages().iter().zip(outcome.stages.iter_mut()) {
        slot.alive = !status_name.is_empty() && stage.reached(status_name);
        if slot.alive {
            outcome.all_alive += 1;
            if stage.counts_as_active_workload {
                outcome.at_work += 1;
            }
        }
    }
    outcome.at_work > 0
}

/// Realized price on reached stages and forecast on alive ones.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub(crate) fn apply_prices(outcome: &mut FunnelOutcome, price: Option<i64>) {
    let price = price.unwrap_or(0);
    let model = std::sync::Arc::clone(&outcome.model);
    for (stage, slot) in model.get_ordered_stages().iter().zip(outcome.stages.iter_mut()) {
        slot.price = (slot.reached && price > 0).then_some(price);
        slot.planned_income = None;
        slot.planned_customers = None;
        if stage.purchase_rate > 0.0 {
            let alive = if slot.alive { 1.0 } else { 0.0 };
            let planned = alive * stage.purchase_rate * price as f64;
            slot.planned_income = (planned != 0.0).then_some(planned);
            let customers = (alive * stage.purchase_rate) as i64;
            slot.planned_customers = (customers != 0).then_some(customers);
        }
        let full = slot.price.unwrap_or(0) as f64 + slot.planned_income.unwrap_or(0.0);
        slot.planned_income_full = (full != 0.0).then_some(full);
    }
}

/// First reached stage of `chain`, with its price.
pub(crate) fn purchase_extended(outcome: &FunnelOutcome, chain: &[String]) -> (bool, Option<i64>) {
    chain
        .iter()
        .filter_map(|key| outcome.stage(key))
        .find(|s| s.reached)
        .map_or((false, None), |s| (true, s.price))
}

/// Writes milestone flags and `duration_30_days` into `fields`.
pub(crate) fn apply_milestones(
    fields: &mut BTreeMap<String, FieldValue>,
    windows: &[MilestoneWindow],
    pipeline_name: &str,
    created: NaiveDate,
    closed: Option<NaiveDate>,
    duration_30_days: bool,
) {
    if duration_30_days {
        if let Some(closed) = closed.filter(|c| *c >= created) {
            let days = (closed - created).num_days();
            fields.insert("duration_30_days".to_string(), FieldValue::Int(days / 30 + 1));
        }
    }
    for window in windows.iter().filter(|w| w.applies_to(pipeline_name)) {
        let Some(date) = fields.get(&window.date_field).and_then(FieldValue::as_date) else {
            continue;
        };
        if date < created {
            continue;
        }
        let within = (date - created).num_days() <= window.days;
        fields.insert(window.key.clone(), FieldValue::flag(within));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::{Stage, StageModel};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn outcome() -> FunnelOutcome {
        let model = StageModel::new(
            "m",
            vec![
                Stage::new("raw_lead", "Raw", 0),
                Stage::new("offer", "Offer", 1)
                    .with_statuses(["Offer sent"])
                    .with_purchase_rate(0.5),
                Stage::new("purchase", "Purchase", 2)
                    .with_statuses(["Won"])
                    .with_purchase_rate(1.0)
                    .not_at_work(),
            ],
        )
        .unwrap();
        FunnelOutcome::new(Arc::new(model))
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_alive_and_at_work() {
        let mut funnel = outcome();
        assert!(mark_alive(&mut funnel, "offer SENT"));
        assert_eq!((funnel.all_alive, funnel.at_work), (1, 1));

        assert!(!mark_alive(&mut funnel, "Won"));
        assert_eq!((funnel.all_alive, funnel.at_work), (1, 0));
        assert!(funnel.stages[2].alive);
    }

    #[test]
    fn test_prices_and_forecast() {
        let mut funnel = outcome();
        funnel.stages[0].reached = true;
        funnel.stages[1].reached = true;
        mark_alive(&mut funnel, "Offer sent");
        apply_prices(&mut funnel, Some(1000));

        let offer = &funnel.stages[1];
        assert_eq!(offer.price, Some(1000));
        assert_eq!(offer.planned_income, Some(500.0));
        assert_eq!(offer.planned_income_full, Some(1500.0));
        assert_eq!(offer.planned_customers, None);

        let purchase = &funnel.stages[2];
        assert_eq!(purchase.price, None);
        assert_eq!(purchase.planned_income_full, None);
    }

    #[test]
    fn test_zero_price_stays_empty() {
        let mut funnel = outcome();
        funnel.stages[1].reached = true;
        apply_prices(&mut funnel, None);
        assert_eq!(funnel.stages[1].price, None);
        assert_eq!(funnel.stages[1].planned_income_full, None);
    }

    #[test]
    fn test_purchase_extended_chain() {
        let mut funnel = outcome();
        let chain = vec!["purchase".to_string(), "offer".to_string()];
        assert_eq!(purchase_extended(&funnel, &chain), (false, None));

        funnel.stages[1].reached = true;
        funnel.stages[1].price = Some(700);
        assert_eq!(purchase_extended(&funnel, &chain), (true, Some(700)));
    }

    #[test]
    fn test_milestones() {
        let windows = vec![
            MilestoneWindow::new("7_days_q", "date_q", 7),
            MilestoneWindow::new("14_days_q", "date_q", 14).for_pipelines(["Italy"]),
        ];
        let mut fields = BTreeMap::from([("date_q".to_string(), FieldValue::Date(date(12)))]);
        apply_milestones(&mut fields, &windows, "Main", date(1), Some(date(31)), true);

        assert_eq!(fields.get("7_days_q"), Some(&FieldValue::Empty));
        assert_eq!(fields.get("14_days_q"), None);
        assert_eq!(fields.get("duration_30_days"), Some(&FieldValue::Int(2)));

        apply_milestones(&mut fields, &windows, "Italy", date(1), None, true);
        assert_eq!(fields.get("14_days_q"), Some(&FieldValue::Int(1)));
    }
}
