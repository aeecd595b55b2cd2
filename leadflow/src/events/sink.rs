//! Diagnostic sinks for data gaps.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};

use super::gap::{DataGap, DataGapKind};

/// Receives data-gap reports.
///
/// Gaps never abort a lead; sinks only record them.
#[async_trait]
pub trait DiagnosticSink: Send + Sync {
    /// Reports a gap asynchronously.
    async fn emit(&self, gap: DataGap);

    /// Reports a gap without blocking. Must never panic.
    fn try_emit(&self, gap: DataGap);
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

#[async_trait]
impl DiagnosticSink for NoOpSink {
    async fn emit(&self, _gap: DataGap) {}

    fn try_emit(&self, _gap: DataGap) {}
}

/// Logs every report through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingSink {
    level: Level,
}

impl Default for LoggingSink {
    fn default() -> Self {
        Self { level: Level::WARN }
    }
}

impl LoggingSink {
    /// Creates a sink logging at `level`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Debug-level sink, for noisy tenants.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_gap(&self, gap: &DataGap) {
        match self.level {
            Level::DEBUG | Level::TRACE => {
                debug!(lead_id = gap.lead_id, kind = %gap.kind, detail = %gap.detail, "Data gap");
            }
            Level::INFO => {
                info!(lead_id = gap.lead_id, kind = %gap.kind, detail = %gap.detail, "Data gap");
            }
            _ => {
                warn!(lead_id = gap.lead_id, kind = %gap.kind, detail = %gap.detail, "Data gap");
            }
        }
    }
}

#[async_trait]
impl DiagnosticSink for LoggingSink {
    async fn emit(&self, gap: DataGap) {
        self.log_gap(&gap);
    }

    fn try_emit(&self, gap: DataGap) {
        self.log_gap(&gap);
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    gaps: RwLock<Vec<DataGap>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All gaps in report order.
    #[must_use]
    pub fn gaps(&self) -> Vec<DataGap> {
        self.gaps.read().clone()
    }

    /// Gaps of one kind.
    #[must_use]
    pub fn gaps_of_kind(&self, kind: DataGapKind) -> Vec<DataGap> {
        self.gaps
            .read()
            .iter()
            .filter(|g| g.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of gaps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gaps.read().len()
    }

    /// Returns true if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gaps.read().is_empty()
    }

    /// Drops all gaps.
    pub fn clear(&self) {
        self.gaps.write().clear();
    }
}

#[async_trait]
impl DiagnosticSink for CollectingSink {
    async fn emit(&self, gap: DataGap) {
        self.gaps.write().push(gap);
    }

    fn try_emit(&self, gap: DataGap) {
        self.gaps.write().push(gap);
    }
}

/// Counts reports per kind and forwards them downstream.
pub struct CountingSink {
    downstream: Arc<dyn DiagnosticSink>,
    total: AtomicU64,
    by_kind: RwLock<BTreeMap<&'static str, u64>>,
}

impl CountingSink {
    /// Wraps `downstream`.
    #[must_use]
    pub fn new(downstream: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            downstream,
            total: AtomicU64::new(0),
            by_kind: RwLock::new(BTreeMap::new()),
        }
    }

    fn record(&self, kind: DataGapKind) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.by_kind.write().entry(kind.as_str()).or_insert(0) += 1;
    }

    /// Reports seen so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Reports per kind, keyed by the dotted kind name.
    #[must_use]
    pub fn by_kind(&self) -> BTreeMap<String, u64> {
        self.by_kind
            .read()
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect()
    }
}

impl std::fmt::Debug for CountingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingSink")
            .field("total", &self.total())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DiagnosticSink for CountingSink {
    async fn emit(&self, gap: DataGap) {
        self.record(gap.kind);
        self.downstream.emit(gap).await;
    }

    fn try_emit(&self, gap: DataGap) {
        self.record(gap.kind);
        self.downstream.try_emit(gap);
    }
}
