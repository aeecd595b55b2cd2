//! Replays status changes to reconstruct funnel reach.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::progress::FunnelProgress;
use super::stage::StageModel;
use crate::events::{DataGap, DataGapKind, DiagnosticSink};
use crate::model::{Event, EventKind, PipelineDirectory, RawLead, StatusRef};
use crate::utils::TimeConverter;

/// Status labels with fixed meaning for history replay and reaction analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLabels {
    /// Labels meaning a manager is trying to reach the client.
    #[serde(default)]
    pub trying_to_get_in_touch: Vec<String>,
    /// Labels meaning the deal was lost.
    #[serde(default)]
    pub closed_failed: Vec<String>,
    /// Labels meaning the deal was won.
    #[serde(default)]
    pub closed_success: Vec<String>,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            trying_to_get_in_touch: vec!["1. TRYING TO GET IN TOUCH".to_string()],
            closed_failed: [
                "9. Закрыто и не реализовано",
                "ЗАКРЫТО И НЕ РЕАЛИЗОВАНО",
                "Closed and unrealized",
                "Закрыто и не реализовано",
                "Closed - lost",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            closed_success: vec![
                "Successfully realized".to_string(),
                "Успешно реализовано".to_string(),
            ],
        }
    }
}

impl StatusLabels {
    /// Returns true for a lost-deal label.
    #[must_use]
    pub fn is_closed_failed(&self, label: &str) -> bool {
        self.closed_failed.iter().any(|l| l == label)
    }

    /// Returns true for a won-deal label.
    #[must_use]
    pub fn is_closed_success(&self, label: &str) -> bool {
        self.closed_success.iter().any(|l| l == label)
    }

    /// Returns true for either closed label.
    #[must_use]
    pub fn is_closed(&self, label: &str) -> bool {
        self.is_closed_failed(label) || self.is_closed_success(label)
    }

    /// Returns true for a "trying to get in touch" label.
    #[must_use]
    pub fn is_trying_to_get_in_touch(&self, label: &str) -> bool {
        self.trying_to_get_in_touch.iter().any(|l| l == label)
    }
}

/// One after-state of a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Resolved label, `None` when the status id is unknown.
    pub label: Option<String>,
    /// Epoch seconds of the change.
    pub at: i64,
}

/// A status label with the first time it was entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenStatus {
    /// Resolved label.
    pub label: Option<String>,
    /// First entry time, `None` when only seen as a before-state.
    pub first_seen: Option<i64>,
}

/// Lost, revived, then won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resurrection {
    /// First transition into a lost label.
    pub unrealized: NaiveDate,
    /// The transition right after it.
    pub reanimated: NaiveDate,
    /// First won transition at or after the revival.
    pub realized: NaiveDate,
}

/// Everything the replay learned about a lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryOutcome {
    /// After-states in time order.
    pub statuses_after: Vec<StatusEntry>,
    /// Distinct labels, before- and after-states.
    pub statuses: Vec<SeenStatus>,
    /// Set when the lead was won after being lost.
    pub resurrection: Option<Resurrection>,
}

/// Reconstructs stage reach from a lead's status changes.
#[derive(Debug, Clone, Copy)]
pub struct FunnelClassifier<'a> {
    model: &'a StageModel,
    pipelines: &'a PipelineDirectory,
    time: &'a TimeConverter,
    labels: &'a StatusLabels,
    check_by_stages: bool,
}

impl<'a> FunnelClassifier<'a> {
    /// Creates a classifier that only tracks resurrection and back-fill.
    #[must_use]
    pub const fn new(
        model: &'a StageModel,
        pipelines: &'a PipelineDirectory,
        time: &'a TimeConverter,
        labels: &'a StatusLabels,
    ) -> Self {
        Self {
            model,
            pipelines,
            time,
            labels,
            check_by_stages: false,
        }
    }

    /// Also marks stages whose status labels appear in the history.
    #[must_use]
    pub const fn with_check_by_stages(mut self, enabled: bool) -> Self {
        self.check_by_stages = enabled;
        self
    }

    /// Replays `lead`'s status changes into `progress`.
    ///
    /// Events are sorted by time first. Events referencing an unknown
    /// pipeline are skipped and reported to `sink`. Back-fill always runs,
    /// so custom-field reach recorded earlier is made monotonic even for a
    /// lead without history.
    pub fn build_history(
        &self,
        lead: &RawLead,
        progress: &mut FunnelProgress,
        sink: &dyn DiagnosticSink,
    ) -> HistoryOutcome {
        let mut outcome = HistoryOutcome::default();
        if lead.events.is_empty() {
            progress.backfill(self.model);
            return outcome;
        }

        let mut events: Vec<&Event> = lead
            .events
            .iter()
            .filter(|e| e.kind == EventKind::StageChanged)
            .collect();
        events.sort_by_key(|e| e.created_at);

        for event in events {
            let (Some(before), Some(after)) = (event.status_before(), event.status_after()) else {
                sink.try_emit(DataGap::new(
                    lead.id,
                    DataGapKind::UnknownStatus,
                    format!("status change at {} without payload", event.created_at),
                ));
                continue;
            };
            let (Some(before_label), Some(after_label)) =
                (self.resolve(lead.id, before, sink), self.resolve(lead.id, after, sink))
            else {
                continue;
            };

            outcome.statuses_after.push(StatusEntry {
                label: after_label.clone(),
                at: event.created_at,
            });
            if !outcome.statuses.iter().any(|s| s.label == before_label) {
                outcome.statuses.push(SeenStatus {
                    label: before_label,
                    first_seen: None,
                });
            }
            if !outcome.statuses.iter().any(|s| s.label == after_label) {
                outcome.statuses.push(SeenStatus {
                    label: after_label,
                    first_seen: Some(event.created_at),
                });
            }
        }

        outcome.resurrection = self.detect_resurrection(&outcome.statuses_after);

        if self.check_by_stages {
            for entry in &outcome.statuses_after {
                let Some(label) = entry.label.as_deref() else {
                    continue;
                };
                if let Some(index) = self.model.index_for_status(label) {
                    progress.mark(index, Some(self.time.local_date(entry.at)));
                }
            }
        }

        progress.backfill(self.model);
        debug!(
            lead_id = lead.id,
            model = self.model.name(),
            transitions = outcome.statuses_after.len(),
            resurrected = outcome.resurrection.is_some(),
            "History replayed"
        );
        outcome
    }

    /// Outer `None` means the pipeline is unknown; inner `None` an unknown status.
    #[allow(clippy::option_option)]
    fn resolve(
        &self,
        lead_id: i64,
        status: StatusRef,
        sink: &dyn DiagnosticSink,
    ) -> Option<Option<String>> {
        let Some(pipeline) = self.pipelines.pipeline(status.pipeline_id) else {
            sink.try_emit(DataGap::new(
                lead_id,
                DataGapKind::UnknownPipeline,
                status.pipeline_id.to_string(),
            ));
            return None;
        };
        let label = pipeline.statuses.get(&status.id).cloned();
        if label.is_none() {
            sink.try_emit(DataGap::new(
                lead_id,
                DataGapKind::UnknownStatus,
                format!("{}:{}", status.pipeline_id, status.id),
            ));
        }
        Some(label)
    }

    fn detect_resurrection(&self, entries: &[StatusEntry]) -> Option<Resurrection> {
        let mut close_time = None;
        let mut reanimation_time = None;
        let mut success_time = None;

        for entry in entries {
            let label = entry.label.as_deref().unwrap_or_default();
            if close_time.is_none() && self.labels.is_closed_failed(label) {
                close_time = Some(entry.at);
                continue;
            }
            if close_time.is_some() && reanimation_time.is_none() {
                reanimation_time = Some(entry.at);
            }
            if reanimation_time.is_some() && self.labels.is_closed_success(label) {
                success_time = Some(entry.at);
                break;
            }
        }

        match (close_time, reanimation_time, success_time) {
            (Some(closed), Some(revived), Some(won)) => Some(Resurrection {
                unrealized: self.time.local_date(closed),
                reanimated: self.time.local_date(revived),
                realized: self.time.local_date(won),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingSink, NoOpSink};
    use crate::funnel::Stage;
    use crate::model::{EventValue, Pipeline};
    use pretty_assertions::assert_eq;

    const PIPE: i64 = 10;
    const DAY: i64 = 86_400;
    // 2024-03-04 00:00:00 UTC
    const T0: i64 = 1_709_510_400;

    fn pipelines() -> PipelineDirectory {
        PipelineDirectory::new().with_pipeline(
            PIPE,
            Pipeline::new("Main")
                .with_status(1, "НОВЫЕ ЗАЯВКИ")
                .with_status(2, "ПРОДОЛЖИТЬ РАБОТУ")
                .with_status(3, "3. QUALIFIED")
                .with_status(4, "LONG")
                .with_status(142, "Успешно реализовано")
                .with_status(143, "Закрыто и не реализовано"),
        )
    }

    fn model() -> StageModel {
        StageModel::new(
            "main",
            vec![
                Stage::new("raw_lead", "Raw", 0),
                Stage::new("lead", "Lead", 1).with_statuses(["НОВЫЕ ЗАЯВКИ", "ПРОДОЛЖИТЬ РАБОТУ"]),
                Stage::new("long_negotiations", "Long", 2).with_statuses(["LONG"]),
                Stage::new("qualification", "Qual", 3).with_statuses(["3. QUALIFIED"]),
                Stage::new("purchase", "Purchase", 4).with_statuses(["Успешно реализовано"]),
            ],
        )
        .unwrap()
    }

    fn change(at: i64, from: i64, to: i64) -> Event {
        change_in(at, (PIPE, from), (PIPE, to))
    }

    fn change_in(at: i64, from: (i64, i64), to: (i64, i64)) -> Event {
        Event {
            kind: EventKind::StageChanged,
            created_at: at,
            created_by: 0,
            value_before: vec![EventValue {
                lead_status: Some(StatusRef { id: from.1, pipeline_id: from.0 }),
                message: None,
            }],
            value_after: vec![EventValue {
                lead_status: Some(StatusRef { id: to.1, pipeline_id: to.0 }),
                message: None,
            }],
        }
    }

    fn lead_with(events: Vec<Event>) -> RawLead {
        let mut lead = RawLead::new(1, T0);
        lead.events = events;
        lead
    }

    fn utc() -> TimeConverter {
        TimeConverter::new(0).unwrap().with_host_offset(0)
    }

    #[test]
    fn test_resurrection_detected() {
        let (model, pipes, time, labels) = (model(), pipelines(), utc(), StatusLabels::default());
        let classifier = FunnelClassifier::new(&model, &pipes, &time, &labels);
        let lead = lead_with(vec![
            change(T0 + 3 * DAY, 2, 142),
            change(T0 + DAY, 1, 143),
            change(T0 + 2 * DAY, 143, 2),
        ]);
        let mut progress = FunnelProgress::new(&model);

        let outcome = classifier.build_history(&lead, &mut progress, &NoOpSink);

        let date = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        assert_eq!(
            outcome.resurrection,
            Some(Resurrection {
                unrealized: date(5),
                reanimated: date(6),
                realized: date(7),
            })
        );
    }

    #[test]
    fn test_no_resurrection_without_success() {
        let (model, pipes, time, labels) = (model(), pipelines(), utc(), StatusLabels::default());
        let classifier = FunnelClassifier::new(&model, &pipes, &time, &labels);
        let lead = lead_with(vec![change(T0 + 1, 1, 143), change(T0 + 2, 143, 2)]);
        let mut progress = FunnelProgress::new(&model);

        let outcome = classifier.build_history(&lead, &mut progress, &NoOpSink);
        assert_eq!(outcome.resurrection, None);
    }

    #[test]
    fn test_success_before_failure_is_not_resurrection() {
        let (model, pipes, time, labels) = (model(), pipelines(), utc(), StatusLabels::default());
        let classifier = FunnelClassifier::new(&model, &pipes, &time, &labels);
        let lead = lead_with(vec![change(T0 + 1, 1, 142), change(T0 + 2, 142, 143)]);
        let mut progress = FunnelProgress::new(&model);

        let outcome = classifier.build_history(&lead, &mut progress, &NoOpSink);
        assert_eq!(outcome.resurrection, None);
    }

    #[test]
    fn test_statuses_dedup_and_order() {
        let (model, pipes, time, labels) = (model(), pipelines(), utc(), StatusLabels::default());
        let classifier = FunnelClassifier::new(&model, &pipes, &time, &labels);
        let lead = lead_with(vec![change(T0 + 20, 3, 2), change(T0 + 10, 1, 3)]);
        let mut progress = FunnelProgress::new(&model);

        let outcome = classifier.build_history(&lead, &mut progress, &NoOpSink);

        let labels: Vec<_> = outcome
            .statuses
            .iter()
            .map(|s| (s.label.clone().unwrap_or_default(), s.first_seen))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("НОВЫЕ ЗАЯВКИ".to_string(), None),
                ("3. QUALIFIED".to_string(), Some(T0 + 10)),
                ("ПРОДОЛЖИТЬ РАБОТУ".to_string(), Some(T0 + 20)),
            ]
        );
        assert_eq!(outcome.statuses_after[0].at, T0 + 10);
    }

    #[test]
    fn test_check_by_stages_marks_and_backfills() {
        let (model, pipes, time, labels) = (model(), pipelines(), utc(), StatusLabels::default());
        let classifier = FunnelClassifier::new(&model, &pipes, &time, &labels).with_check_by_stages(true);
        let lead = lead_with(vec![change(T0 + DAY, 1, 3)]);
        let mut progress = FunnelProgress::new(&model);

        classifier.build_history(&lead, &mut progress, &NoOpSink);

        assert_eq!(progress.flags(), &[true, true, false, true, false]);
        assert_eq!(progress.date(3), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(progress.date(1), None);
    }

    #[test]
    fn test_without_check_by_stages_history_does_not_mark() {
        let (model, pipes, time, labels) = (model(), pipelines(), utc(), StatusLabels::default());
        let classifier = FunnelClassifier::new(&model, &pipes, &time, &labels);
        let lead = lead_with(vec![change(T0 + DAY, 1, 3)]);
        let mut progress = FunnelProgress::new(&model);

        classifier.build_history(&lead, &mut progress, &NoOpSink);
        assert!(progress.flags().iter().all(|r| !r));
    }

    #[test]
    fn test_unknown_pipeline_reported_and_skipped() {
        let (model, pipes, time, labels) = (model(), pipelines(), utc(), StatusLabels::default());
        let classifier = FunnelClassifier::new(&model, &pipes, &time, &labels).with_check_by_stages(true);
        let lead = lead_with(vec![change_in(T0, (PIPE, 1), (99, 3)), change(T0 + 5, 1, 9)]);
        let mut progress = FunnelProgress::new(&model);
        let sink = CollectingSink::new();

        let outcome = classifier.build_history(&lead, &mut progress, &sink);

        assert_eq!(outcome.statuses_after.len(), 1);
        assert_eq!(outcome.statuses_after[0].label, None);
        assert_eq!(sink.gaps_of_kind(DataGapKind::UnknownPipeline).len(), 1);
        assert_eq!(sink.gaps_of_kind(DataGapKind::UnknownStatus).len(), 1);
    }

    #[test]
    fn test_no_events_still_backfills() {
        let (model, pipes, time, labels) = (model(), pipelines(), utc(), StatusLabels::default());
        let classifier = FunnelClassifier::new(&model, &pipes, &time, &labels);
        let lead = lead_with(Vec::new());
        let mut progress = FunnelProgress::new(&model);
        progress.mark(4, None);

        let outcome = classifier.build_history(&lead, &mut progress, &NoOpSink);

        assert_eq!(outcome, HistoryOutcome::default());
        assert_eq!(progress.flags(), &[true, true, false, true, true]);
    }
}
