use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::stage::StageModel;

/// Reach flags and dates for one funnel, indexed like the model's stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelProgress {
    reached: Vec<bool>,
    dates: Vec<Option<NaiveDate>>,
}

impl FunnelProgress {
    /// Creates an all-unreached progress vector for `model`.
    #[must_use]
    pub fn new(model: &StageModel) -> Self {
        Self {
            reached: vec![false; model.len()],
            dates: vec![None; model.len()],
        }
    }

    /// Number of stages tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reached.len()
    }

    /// Returns true when tracking no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reached.is_empty()
    }

    /// Reach flag of stage `index`.
    #[must_use]
    pub fn is_reached(&self, index: usize) -> bool {
        self.reached.get(index).copied().unwrap_or(false)
    }

    /// Reach date of stage `index`.
    #[must_use]
    pub fn date(&self, index: usize) -> Option<NaiveDate> {
        self.dates.get(index).copied().flatten()
    }

    /// Overwrites the reach flag, leaving the date alone.
    pub fn set_reached(&mut self, index: usize, reached: bool) {
        if let Some(flag) = self.reached.get_mut(index) {
            *flag = reached;
        }
    }

    /// Marks stage `index` reached, replacing its date.
    pub fn mark(&mut self, index: usize, date: Option<NaiveDate>) {
        if index < self.reached.len() {
            self.reached[index] = true;
            self.dates[index] = date;
        }
    }

    /// Applies the model's back-fill rule.
    pub fn backfill(&mut self, model: &StageModel) {
        model.backfill(&mut self.reached);
    }

    /// Reach flags in stage order.
    #[must_use]
    pub fn flags(&self) -> &[bool] {
        &self.reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::Stage;

    #[test]
    fn test_mark_and_backfill() {
        let model = StageModel::new(
            "m",
            vec![
                Stage::new("raw_lead", "Raw", 0),
                Stage::new("lead", "Lead", 1).with_statuses(["A"]),
                Stage::new("won", "Won", 2).with_statuses(["B"]),
            ],
        )
        .unwrap();
        let mut progress = FunnelProgress::new(&model);
        let day = NaiveDate::from_ymd_opt(2024, 3, 4);

        progress.mark(2, day);
        progress.backfill(&model);

        assert_eq!(progress.flags(), &[true, true, true]);
        assert_eq!(progress.date(2), day);
        assert_eq!(progress.date(1), None);

        progress.set_reached(2, false);
        assert!(!progress.is_reached(2));
        assert!(!progress.is_reached(99));
    }
}
