//! Per-batch wide event.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

/// One structured event summarising a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Tenant name.
    pub tenant: String,
    /// Run id (UUID v7).
    pub run_id: String,
    /// Leads handed to the batch.
    pub leads: usize,
    /// Records produced.
    pub records: usize,
    /// Leads dropped because they were created outside the window.
    pub skipped: usize,
    /// Deleted or merged leads among the records.
    pub deleted: usize,
    /// Records counted as leads.
    pub qualified: usize,
    /// Data gaps reported while building.
    pub data_gaps: u64,
    /// Data gaps per kind.
    pub gaps_by_kind: BTreeMap<String, u64>,
    /// Wall time of the run.
    pub elapsed_ms: u64,
}

impl BatchSummary {
    /// Starts a summary for `tenant` and `run_id`.
    #[must_use]
    pub fn new(tenant: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            run_id: run_id.into(),
            ..Self::default()
        }
    }

    /// JSON payload of the event.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Logs the summary as one `info` event.
    pub fn emit(&self) {
        info!(
            event = "batch.wide",
            tenant = %self.tenant,
            run_id = %self.run_id,
            leads = self.leads,
            records = self.records,
            skipped = self.skipped,
            deleted = self.deleted,
            qualified = self.qualified,
            data_gaps = self.data_gaps,
            elapsed_ms = self.elapsed_ms,
            "Batch finished"
        );
    }
}

/// Wall-clock timer for a run.
#[derive(Debug)]
pub struct RunTimer {
    start: Instant,
}

impl RunTimer {
    /// Starts timing.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since start.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_payload() {
        let mut summary = BatchSummary::new("swiss_medica", "run-1");
        summary.leads = 3;
        summary.records = 2;
        summary.skipped = 1;
        summary.gaps_by_kind.insert("data_gap.unknown_user".to_string(), 2);

        let value = summary.to_value();
        assert_eq!(value["tenant"], "swiss_medica");
        assert_eq!(value["records"], 2);
        assert_eq!(value["gaps_by_kind"]["data_gap.unknown_user"], 2);
        summary.emit();
    }

    #[test]
    fn test_run_timer() {
        let timer = RunTimer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5);
    }
}
