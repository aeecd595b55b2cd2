//! Batch execution: fetch, build every lead, then run the batch-wide passes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::builder::{LeadRecordBuilder, PendingLead};
use crate::cancellation::CancellationToken;
use crate::errors::{FetchError, LeadflowError};
use crate::events::{CountingSink, DiagnosticSink, NoOpSink};
use crate::fetch::LeadSource;
use crate::model::{RawLead, ReferenceData};
use crate::observability::{BatchSummary, RunTimer};
use crate::reaction::{DutySchedule, ReactionAnalyzer};
use crate::record::{FieldValue, OutputRecord, Row};
use crate::tenant::{Tenant, TenantRegistry};
use crate::utils::{monday_of, FetchWindow};

/// Seconds an event may precede creation before the creation time is suspect.
const CREATED_AT_TOLERANCE_SECS: i64 = 3600;

/// Minimum phone length for dialing-code lookup.
const MIN_PHONE_LEN: usize = 6;

/// Country used when no dialing code matches.
const UNKNOWN_COUNTRY: &str = "Other";

/// Per-run switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Worker count for the build step; `1` builds inline.
    pub parallelism: usize,
    /// Align the earliest date of each weekly field to its Monday.
    pub weekly: bool,
    /// Count calls, chats and emails per lead.
    pub communication_stats: bool,
    /// Duty schedule overriding the tenant's.
    pub schedule: Option<DutySchedule>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            weekly: false,
            communication_stats: false,
            schedule: None,
        }
    }
}

impl BatchOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count.
    #[must_use]
    pub const fn with_parallelism(mut self, workers: usize) -> Self {
        self.parallelism = workers;
        self
    }

    /// Enables weekly alignment.
    #[must_use]
    pub const fn with_weekly(mut self, weekly: bool) -> Self {
        self.weekly = weekly;
        self
    }

    /// Enables communication counters.
    #[must_use]
    pub const fn with_communication_stats(mut self, enabled: bool) -> Self {
        self.communication_stats = enabled;
        self
    }

    /// Overrides the duty schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: DutySchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }
}

/// Records of one run and its summary.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// One record per lead, in input order.
    pub records: Vec<OutputRecord>,
    /// Run summary.
    pub summary: BatchSummary,
}

impl BatchOutput {
    /// Flat rows for exporters.
    #[must_use]
    pub fn records_as_rows(&self) -> Vec<Row> {
        self.records.iter().map(OutputRecord::to_row).collect()
    }

    /// Rows as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns a serialization error.
    pub fn to_json(&self) -> Result<String, LeadflowError> {
        Ok(serde_json::to_string(&self.records_as_rows())?)
    }
}

/// Runs one tenant over one date range.
pub struct BatchPipeline {
    tenant: Arc<Tenant>,
    source: Arc<dyn LeadSource>,
    options: BatchOptions,
    cancellation: Arc<CancellationToken>,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for BatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchPipeline")
            .field("tenant", &self.tenant.name())
            .field("source", &self.source)
            .field("options", &self.options)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

impl BatchPipeline {
    /// Creates a pipeline with default options.
    #[must_use]
    pub fn new(tenant: Arc<Tenant>, source: Arc<dyn LeadSource>) -> Self {
        Self {
            tenant,
            source,
            options: BatchOptions::default(),
            cancellation: Arc::new(CancellationToken::new()),
            sink: Arc::new(NoOpSink),
        }
    }

    /// Creates a pipeline for a registered tenant.
    ///
    /// # Errors
    ///
    /// Returns [`LeadflowError::UnknownTenant`] when `name` is not registered.
    pub fn from_registry(
        registry: &TenantRegistry,
        name: &str,
        source: Arc<dyn LeadSource>,
    ) -> Result<Self, LeadflowError> {
        Ok(Self::new(registry.get(name)?, source))
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Routes data gaps to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancellation)
    }

    /// Fetches and processes every lead created between the two operator dates.
    ///
    /// # Errors
    ///
    /// Fails on fetch errors past the retry budget, on cancellation and on
    /// worker panics.
    pub async fn run(
        &self,
        date_from: NaiveDateTime,
        date_to: NaiveDateTime,
    ) -> Result<BatchOutput, LeadflowError> {
        let run_id = Uuid::now_v7();
        let span = info_span!("batch", tenant = %self.tenant.name(), run_id = %run_id);
        async move {
            self.cancellation.check()?;
            let window = self.tenant.time().window_shift(date_from, date_to);
            info!(from_ts = window.from_ts, to_ts = window.to_ts, "Fetching leads");

            let fetch = async {
                let leads = self.source.leads(window).await?;
                let refs = self.source.reference_data().await?;
                Ok::<_, FetchError>((leads, refs))
            };
            let (leads, refs) = tokio::select! {
                fetched = fetch => fetched?,
                () = self.cancellation.cancelled() => {
                    return Err(self.cancellation.check().err().unwrap_or_else(|| {
                        LeadflowError::Cancelled("cancelled".to_string())
                    }));
                }
            };

            let total = leads.len();
            let leads: Vec<RawLead> = leads
                .into_iter()
                .filter(|l| in_window(l, window))
                .collect();
            let skipped = total - leads.len();
            self.process(run_id, leads, refs, skipped).await
        }
        .instrument(span)
        .await
    }

    /// Processes already-fetched leads.
    ///
    /// # Errors
    ///
    /// Fails on cancellation and on worker panics.
    pub async fn run_leads(
        &self,
        leads: Vec<RawLead>,
        refs: ReferenceData,
    ) -> Result<BatchOutput, LeadflowError> {
        let run_id = Uuid::now_v7();
        let span = info_span!("batch", tenant = %self.tenant.name(), run_id = %run_id);
        self.process(run_id, leads, refs, 0).instrument(span).await
    }

    async fn process(
        &self,
        run_id: Uuid,
        leads: Vec<RawLead>,
        refs: ReferenceData,
        skipped: usize,
    ) -> Result<BatchOutput, LeadflowError> {
        let timer = RunTimer::start();
        let mut summary = BatchSummary::new(self.tenant.name(), run_id.to_string());
        summary.leads = leads.len() + skipped;
        summary.skipped = skipped;

        let refs = Arc::new(refs);
        let counting = Arc::new(CountingSink::new(Arc::clone(&self.sink)));
        let sink: Arc<dyn DiagnosticSink> = counting.clone();

        let mut pending = self.build_all(leads, &refs, &sink).await?;
        mark_created_at_offset(&mut pending);
        self.react(&mut pending, &refs, sink.as_ref())?;

        let mut records: Vec<OutputRecord> =
            pending.into_iter().map(PendingLead::into_record).collect();
        self.country_by_phone(&mut records);
        if self.options.weekly {
            for field in &self.tenant.config().weekly_date_fields {
                align_smallest_to_monday(&mut records, field);
            }
        }

        summary.records = records.len();
        summary.deleted = records.iter().filter(|r| r.deleted).count();
        summary.qualified = records.iter().filter(|r| r.is_lead).count();
        summary.data_gaps = counting.total();
        summary.gaps_by_kind = counting.by_kind();
        summary.elapsed_ms = timer.elapsed_ms();
        summary.emit();

        Ok(BatchOutput { records, summary })
    }

    async fn build_all(
        &self,
        leads: Vec<RawLead>,
        refs: &Arc<ReferenceData>,
        sink: &Arc<dyn DiagnosticSink>,
    ) -> Result<Vec<PendingLead>, LeadflowError> {
        let workers = self.options.parallelism.max(1);
        if workers == 1 || leads.len() < 2 {
            return build_chunk(&self.tenant, refs, leads, sink.as_ref(), &self.cancellation);
        }

        let total = leads.len();
        let chunk_size = total.div_ceil(workers);
        let mut rest = leads;
        let mut handles = Vec::with_capacity(workers);
        while !rest.is_empty() {
            let tail = rest.split_off(chunk_size.min(rest.len()));
            let chunk = std::mem::replace(&mut rest, tail);
            let tenant = Arc::clone(&self.tenant);
            let refs = Arc::clone(refs);
            let sink = Arc::clone(sink);
            let token = Arc::clone(&self.cancellation);
            handles.push(tokio::task::spawn_blocking(move || {
                build_chunk(&tenant, &refs, chunk, sink.as_ref(), &token)
            }));
        }
        debug!(total, chunks = handles.len(), "Building in parallel");

        let mut pending = Vec::with_capacity(total);
        for joined in futures::future::join_all(handles).await {
            let chunk = joined.map_err(|e| LeadflowError::Join(e.to_string()))??;
            pending.extend(chunk);
        }
        Ok(pending)
    }

    fn react(
        &self,
        pending: &mut [PendingLead],
        refs: &ReferenceData,
        sink: &dyn DiagnosticSink,
    ) -> Result<(), LeadflowError> {
        let config = self.tenant.config();
        let mut analyzer = ReactionAnalyzer::new(refs, self.tenant.time(), &config.status_labels)
            .with_communication_stats(self.options.communication_stats);
        if let Some(schedule) = self.options.schedule.as_ref().or(config.schedule.as_ref()) {
            analyzer = analyzer.with_schedule(schedule);
        }
        for item in pending.iter_mut() {
            self.cancellation.check()?;
            analyzer.process(&item.lead, &mut item.record, sink);
        }
        Ok(())
    }

    fn country_by_phone(&self, records: &mut [OutputRecord]) {
        let codes = &self.tenant.config().country.dialing_codes;
        for record in records.iter_mut().filter(|r| r.country.is_empty()) {
            let Some(phone) = record.phone.first() else {
                continue;
            };
            if phone.len() < MIN_PHONE_LEN {
                continue;
            }
            record.country = codes.country_for(phone).unwrap_or(UNKNOWN_COUNTRY).to_string();
        }
    }
}

fn in_window(lead: &RawLead, window: FetchWindow) -> bool {
    lead.created_at >= window.from_ts && lead.created_at <= window.to_ts
}

fn build_chunk(
    tenant: &Tenant,
    refs: &ReferenceData,
    leads: Vec<RawLead>,
    sink: &dyn DiagnosticSink,
    token: &CancellationToken,
) -> Result<Vec<PendingLead>, LeadflowError> {
    let builder = LeadRecordBuilder::new(tenant, refs);
    let mut out = Vec::with_capacity(leads.len());
    for lead in leads {
        token.check()?;
        out.push(builder.build_pending(lead, sink));
    }
    Ok(out)
}

/// Flags leads whose history starts well before their creation time.
fn mark_created_at_offset(pending: &mut [PendingLead]) {
    for item in pending {
        let created = item.lead.created_at;
        item.record.created_at_offset = item
            .lead
            .earliest_event_ts()
            .map_or(true, |earliest| earliest - created < -CREATED_AT_TOLERANCE_SECS);
    }
}

/// Moves the smallest date of `field` back to its Monday.
///
/// Every record holding that smallest date is moved.
fn align_smallest_to_monday(records: &mut [OutputRecord], field: &str) {
    let smallest = records
        .iter()
        .filter_map(|r| r.fields.get(field).and_then(FieldValue::as_date))
        .min();
    let Some(smallest) = smallest else {
        return;
    };
    let monday = FieldValue::Date(monday_of(smallest));
    for record in records.iter_mut() {
        if let Some(value) = record.fields.get_mut(field) {
            if value.as_date() == Some(smallest) {
                *value = monday.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingSink, DataGapKind};
    use crate::fetch::StaticLeadSource;
    use crate::tenant::presets;
    use crate::testing::{LeadFixture, ReferenceFixture};
    use crate::utils::TimeConverter;
    use chrono::{NaiveDate, NaiveTime};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    // Monday 2024-03-04 10:00:00 UTC, 13:00 in the tenant zone.
    const T0: i64 = 1_709_546_400;
    const DAY: i64 = 86_400;

    fn tenant() -> Arc<Tenant> {
        let time = TimeConverter::new(3).unwrap().with_host_offset(0);
        Arc::new(
            Tenant::new(presets::swiss_medica().unwrap())
                .unwrap()
                .with_time(time),
        )
    }

    fn refs() -> ReferenceData {
        ReferenceFixture::new()
            .pipeline(
                100,
                "Main",
                &[(1, "НОВЫЕ ЗАЯВКИ"), (2, "1. TRYING TO GET IN TOUCH")],
            )
            .user(5, "Ana")
            .build()
    }

    fn lead(id: i64, created_at: i64) -> LeadFixture {
        LeadFixture::new(id, created_at)
            .in_status(100, 1)
            .with_responsible(5)
    }

    fn pipeline(leads: Vec<RawLead>) -> BatchPipeline {
        BatchPipeline::new(tenant(), Arc::new(StaticLeadSource::new(leads, refs())))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn day_start(y: i32, m: u32, d: u32) -> NaiveDateTime {
        date(y, m, d).and_time(NaiveTime::MIN)
    }

    #[tokio::test]
    async fn test_run_filters_window_and_keeps_order() {
        let leads = vec![
            lead(1, T0).build(),
            lead(2, T0 + 3600).build(),
            lead(3, T0 + 10 * DAY).build(),
        ];
        let output = pipeline(leads)
            .run(day_start(2024, 3, 4), day_start(2024, 3, 5))
            .await
            .unwrap();

        let ids: Vec<i64> = output.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(output.summary.tenant, "swiss_medica");
        assert_eq!(output.summary.leads, 2);
        assert_eq!(output.summary.records, 2);
        assert_eq!(output.summary.qualified, 2);
        assert!(!output.summary.run_id.is_empty());
    }

    #[tokio::test]
    async fn test_window_is_tenant_local() {
        // 2024-03-03 21:30 UTC is 00:30 on Monday in the tenant zone.
        let early = T0 - 12 * 3600 - 1800;
        let output = pipeline(vec![lead(1, early).build()])
            .run(day_start(2024, 3, 4), day_start(2024, 3, 5))
            .await
            .unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].created_at, date(2024, 3, 4));
    }

    #[tokio::test]
    async fn test_created_at_offset() {
        let leads = vec![
            lead(1, T0).build(),
            lead(2, T0).event(crate::model::EventKind::LeadAdded, T0, 0).build(),
            lead(3, T0)
                .event(crate::model::EventKind::LeadAdded, T0 - 2 * 3600, 0)
                .build(),
        ];
        let output = pipeline(vec![]).run_leads(leads, refs()).await.unwrap();
        let flags: Vec<bool> = output.records.iter().map(|r| r.created_at_offset).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_outgoing_call_reaction_on_duty() {
        let schedule = DutySchedule::new()
            .with_day(
                0,
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            )
            .unwrap();
        let leads = vec![lead(1, T0).call_note(false, T0 + 120, 5, "itgrix_amo", 130).build()];
        let output = pipeline(vec![])
            .with_options(BatchOptions::new().with_schedule(schedule))
            .run_leads(leads, refs())
            .await
            .unwrap();

        let reaction = &output.records[0].reaction;
        assert_eq!(reaction.reaction_type, "outgoing_call");
        assert_eq!(reaction.duty_time, "duty time");
        assert_eq!(reaction.reaction_time_on_duty_sec, Some(120));
        assert!(reaction.callback_on_duty.less_300);
    }

    #[tokio::test]
    async fn test_country_by_phone() {
        let leads = vec![
            lead(1, T0).with_phone("+381 64 123-45-67").build(),
            lead(2, T0).with_phone("99912345").build(),
            lead(3, T0).with_phone("12345").build(),
            lead(4, T0)
                .with_phone("+381 64 123-45-67")
                .with_custom("Country", json!("Italy"))
                .build(),
        ];
        let output = pipeline(vec![]).run_leads(leads, refs()).await.unwrap();
        let countries: Vec<&str> = output.records.iter().map(|r| r.country.as_str()).collect();
        assert_eq!(countries, vec!["Serbia", "Other", "", "Italy"]);
    }

    #[tokio::test]
    async fn test_weekly_alignment() {
        let wednesday = T0 + 2 * DAY;
        let friday = T0 + 4 * DAY;
        let consent = "Дата предварительного согласия";
        let leads = vec![
            lead(1, T0).with_custom(consent, json!(friday)).build(),
            lead(2, T0).with_custom(consent, json!(wednesday)).build(),
            lead(3, T0).build(),
        ];

        let aligned = pipeline(vec![])
            .with_options(BatchOptions::new().with_weekly(true))
            .run_leads(leads.clone(), refs())
            .await
            .unwrap();
        let plain = pipeline(vec![]).run_leads(leads, refs()).await.unwrap();

        let consent_of = |out: &BatchOutput, i: usize| {
            out.records[i].field("date_of_prior_consent").cloned()
        };
        assert_eq!(consent_of(&aligned, 0), Some(FieldValue::Date(date(2024, 3, 8))));
        assert_eq!(consent_of(&aligned, 1), Some(FieldValue::Date(date(2024, 3, 4))));
        assert_eq!(consent_of(&plain, 1), Some(FieldValue::Date(date(2024, 3, 6))));
    }

    #[tokio::test]
    async fn test_parallel_build_matches_sequential() {
        let leads: Vec<RawLead> = (0..10)
            .map(|i| {
                lead(i, T0 + i * 60)
                    .status_change(T0 + i * 60 + 300, 5, (100, 1), (100, 2))
                    .build()
            })
            .collect();

        let sequential = pipeline(vec![]).run_leads(leads.clone(), refs()).await.unwrap();
        let parallel = pipeline(vec![])
            .with_options(BatchOptions::new().with_parallelism(4))
            .run_leads(leads, refs())
            .await
            .unwrap();

        assert_eq!(parallel.records_as_rows(), sequential.records_as_rows());
        assert_eq!(parallel.summary.records, 10);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = Arc::new(CancellationToken::new());
        token.cancel("operator stop");
        let result = pipeline(vec![lead(1, T0).build()])
            .with_cancellation(token)
            .run(day_start(2024, 3, 4), day_start(2024, 3, 5))
            .await;

        match result {
            Err(LeadflowError::Cancelled(reason)) => assert_eq!(reason, "operator stop"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_data_gaps_counted_and_forwarded() {
        let sink = Arc::new(CollectingSink::new());
        let leads = vec![lead(1, T0).with_responsible(99).build()];
        let output = pipeline(vec![])
            .with_sink(sink.clone())
            .run_leads(leads, refs())
            .await
            .unwrap();

        assert!(!sink.gaps_of_kind(DataGapKind::UnknownUser).is_empty());
        assert_eq!(output.summary.data_gaps, sink.len() as u64);
        assert!(output
            .summary
            .gaps_by_kind
            .contains_key("data_gap.unknown_user"));
    }

    #[tokio::test]
    async fn test_from_registry() {
        let registry = TenantRegistry::new();
        let source: Arc<dyn LeadSource> = Arc::new(StaticLeadSource::default());
        assert!(matches!(
            BatchPipeline::from_registry(&registry, "swiss_medica", Arc::clone(&source)),
            Err(LeadflowError::UnknownTenant(_))
        ));

        registry.register_config(presets::swiss_medica().unwrap()).unwrap();
        let pipeline = BatchPipeline::from_registry(&registry, "swiss_medica", source).unwrap();
        let output = pipeline.run_leads(vec![], ReferenceData::default()).await.unwrap();
        assert!(output.records.is_empty());
        assert_eq!(output.to_json().unwrap(), "[]");
    }
}
