//! Builds one [`OutputRecord`] per raw lead.
//!
//! The build runs in a fixed order: base columns, custom fields, funnel
//! history, date casting, milestones, prices, purchase fallback, phones.
//! It reads only the lead, the tenant and the batch reference data, so
//! building the same lead twice gives identical records.

mod custom;
mod revenue;

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::attribution::AttributionResolver;
use crate::events::{DataGap, DataGapKind, DiagnosticSink};
use crate::funnel::{FunnelClassifier, FunnelProgress, StageModel, StatusLabels};
use crate::model::{value_is_truthy, RawLead, ReferenceData, StatusRef};
use crate::record::{FieldValue, FunnelOutcome, OutputRecord};
use crate::tenant::Tenant;

/// A built record waiting for the batch-wide passes.
///
/// The raw lead travels alongside so the reaction pass can read its notes,
/// events and tasks. Only the record leaves the pipeline.
#[derive(Debug, Clone)]
pub struct PendingLead {
    /// The record built so far.
    pub record: OutputRecord,
    /// The lead it was built from.
    pub lead: RawLead,
}

impl PendingLead {
    /// Pairs a record with its lead.
    #[must_use]
    pub const fn new(record: OutputRecord, lead: RawLead) -> Self {
        Self { record, lead }
    }

    /// Drops the transient timeline.
    #[must_use]
    pub fn into_record(self) -> OutputRecord {
        self.record
    }
}

/// Normalises the first loss reason.
///
/// An empty reason or `(blank)` reads `closed with no reason` on a closed
/// status and `active` otherwise.
#[must_use]
pub fn normalize_loss_reason(raw: Option<&str>, status_name: &str, labels: &StatusLabels) -> String {
    match raw {
        Some(reason) if !reason.is_empty() && reason != "(blank)" => reason.to_string(),
        _ if labels.is_closed(status_name) => "closed with no reason".to_string(),
        _ => "active".to_string(),
    }
}

/// Value of a raw lead attribute by name.
fn raw_attribute(lead: &RawLead, key: &str) -> FieldValue {
    match key {
        "id" => FieldValue::Int(lead.id),
        "name" => lead.name.as_str().into(),
        "price" => lead.price.into(),
        "pipeline_id" => lead.pipeline_id.into(),
        "status_id" => lead.status_id.into(),
        "responsible_user_id" => lead.responsible_user_id.into(),
        "created_at" => FieldValue::Int(lead.created_at),
        "updated_at" => lead.updated_at.into(),
        "closed_at" => lead.closed_at.into(),
        _ => FieldValue::Empty,
    }
}

/// Turns a raw lead into a record for one tenant.
#[derive(Debug, Clone, Copy)]
pub struct LeadRecordBuilder<'a> {
    tenant: &'a Tenant,
    refs: &'a ReferenceData,
}

impl<'a> LeadRecordBuilder<'a> {
    /// Creates a builder over the batch's reference data.
    #[must_use]
    pub const fn new(tenant: &'a Tenant, refs: &'a ReferenceData) -> Self {
        Self { tenant, refs }
    }

    /// Builds the record and keeps the lead for the batch passes.
    pub fn build_pending(&self, lead: RawLead, sink: &dyn DiagnosticSink) -> PendingLead {
        let record = self.build(&lead, sink);
        PendingLead::new(record, lead)
    }

    /// Builds the record of one lead.
    ///
    /// Never fails: missing reference entries become empty columns and are
    /// reported to `sink`.
    pub fn build(&self, lead: &RawLead, sink: &dyn DiagnosticSink) -> OutputRecord {
        let config = self.tenant.config();
        let policy = self.tenant.policy();
        let models = self.tenant.models();

        let mut record = self.base_record(lead, sink);
        record.is_lead = policy.is_lead(lead);
        record.is_target = policy.is_target(lead, record.is_lead);

        let mut progress: Vec<FunnelProgress> = models
            .iter()
            .map(|model| Self::seed_progress(model, &record))
            .collect();

        let custom = custom::resolve_custom_fields(
            lead,
            &config.fields,
            &config.country,
            config.offer_speed.as_ref(),
        );
        record.fields.extend(custom.columns);
        record.country = custom.country;
        if let Some((key, days)) = custom.offer_speed {
            record.fields.insert(key, FieldValue::Int(days));
        }
        if record.is_lead {
            for (model, funnel) in models.iter().zip(progress.iter_mut()) {
                Self::mark_by_custom_fields(model, lead, funnel);
            }
        }

        for (model, funnel) in models.iter().zip(progress.iter_mut()) {
            if let Some(index) = model.index_of("target") {
                funnel.set_reached(index, record.is_target);
            }
            let history = FunnelClassifier::new(
                model,
                &self.refs.pipelines,
                self.tenant.time(),
                &config.status_labels,
            )
            .with_check_by_stages(config.check_by_stages)
            .build_history(lead, funnel, sink);
            if record.resurrection.is_none() {
                record.resurrection = history.resurrection;
            }
        }

        self.cast_dates(&mut record.fields);
        if policy.is_lead_reason(&record.loss_reason) {
            revenue::apply_milestones(
                &mut record.fields,
                &config.milestones,
                &record.pipeline_name,
                record.created_at,
                record.closed_at,
                config.duration_30_days,
            );
        }

        record.funnels = models
            .iter()
            .zip(&progress)
            .map(|(model, funnel)| Self::outcome(model, funnel, &record.status_name, lead.price))
            .collect();
        record.at_work_any_pipeline = record.funnels.iter().any(|f| f.at_work > 0);
        if let Some(primary) = record.funnels.first() {
            (record.purchase_extended, record.purchase_extended_price) =
                revenue::purchase_extended(primary, &config.purchase_chain);
        }

        record.phone = lead.contact_phones();
        policy.finalize(&mut record);

        debug!(
            lead_id = lead.id,
            tenant = self.tenant.name(),
            is_lead = record.is_lead,
            is_target = record.is_target,
            status = %record.status_name,
            "Lead record built"
        );
        record
    }

    fn base_record(&self, lead: &RawLead, sink: &dyn DiagnosticSink) -> OutputRecord {
        let config = self.tenant.config();
        let time = self.tenant.time();
        let local = |ts: Option<i64>| ts.filter(|t| *t != 0).map(|t| time.local_date(t));

        let mut record = OutputRecord::new(lead.id, time.local_date(lead.created_at));
        for spec in &config.fields {
            let value = if spec.is_raw {
                raw_attribute(lead, &spec.key)
            } else {
                FieldValue::Empty
            };
            record.fields.insert(spec.key.clone(), value);
        }

        record.name.clone_from(&lead.name);
        record.price = lead.price;
        record.created_at_hour = time.local_hour(lead.created_at);
        record.updated_at = local(lead.updated_at);
        record.closed_at = local(lead.closed_at);

        let (pipeline_name, status_name) = self.location(lead, sink);
        record.pipeline_name = pipeline_name;
        record.status_name = status_name;

        if let Some(user) = self.user(lead.id, lead.responsible_user_id, sink) {
            record.responsible_user_name.clone_from(&user.name);
            record.responsible_group = user.group.clone().unwrap_or_default();
        }

        record.loss_reason =
            normalize_loss_reason(lead.loss_reason(), &record.status_name, &config.status_labels);
        record.link = self.tenant.link_for(lead.id);
        record.tags = lead.tag_names().collect::<Vec<_>>().join(", ");
        record.jivo = lead.tag_names().any(|t| t.to_lowercase().contains("jivo"));
        record.input_field = lead.input_field().unwrap_or_default();

        if let Some(deletion) = &lead.deleted {
            record.deleted = true;
            record.deleted_by = self
                .user(lead.id, deletion.user_id, sink)
                .map(|u| u.name.clone())
                .unwrap_or_default();
        }

        record.attribution = self.tenant.attribution().resolve(lead);
        record.raw_utm = AttributionResolver::raw_utms(lead);
        record
    }

    /// Pipeline name and status label of the lead's current position.
    fn location(&self, lead: &RawLead, sink: &dyn DiagnosticSink) -> (String, String) {
        let Some(pipeline_id) = lead.pipeline_id else {
            return (String::new(), String::new());
        };
        let Some(pipeline) = self.refs.pipelines.pipeline(pipeline_id) else {
            sink.try_emit(DataGap::new(
                lead.id,
                DataGapKind::UnknownPipeline,
                format!("pipeline {pipeline_id}"),
            ));
            return (String::new(), String::new());
        };
        let status = lead.status_id.and_then(|id| {
            self.refs.pipelines.status_label(StatusRef {
                id,
                pipeline_id,
            })
        });
        if status.is_none() {
            sink.try_emit(DataGap::new(
                lead.id,
                DataGapKind::UnknownStatus,
                format!("status {:?} in pipeline {pipeline_id}", lead.status_id),
            ));
        }
        (pipeline.name.clone(), status.unwrap_or_default().to_string())
    }

    fn user(
        &self,
        lead_id: i64,
        user_id: Option<i64>,
        sink: &dyn DiagnosticSink,
    ) -> Option<&'a crate::model::User> {
        let id = user_id.filter(|id| *id > 0)?;
        let user = self.refs.users.get(id);
        if user.is_none() {
            sink.try_emit(DataGap::new(lead_id, DataGapKind::UnknownUser, format!("user {id}")));
        }
        user
    }

    fn seed_progress(model: &StageModel, record: &OutputRecord) -> FunnelProgress {
        let mut progress = FunnelProgress::new(model);
        for (key, reached) in [
            ("raw_lead", true),
            ("lead", record.is_lead),
            ("target", record.is_target),
        ] {
            if let Some(index) = model.index_of(key) {
                progress.set_reached(index, reached);
            }
        }
        progress
    }

    /// A filled inclusion field marks its stage, an empty one clears it.
    fn mark_by_custom_fields(model: &StageModel, lead: &RawLead, progress: &mut FunnelProgress) {
        for field in &lead.custom_fields_values {
            let filled = value_is_truthy(field.first());
            for (index, stage) in model.get_ordered_stages().iter().enumerate() {
                if stage.includes_field(&field.field_name) {
                    progress.set_reached(index, filled);
                }
            }
        }
    }

    /// Epoch columns declared as dates become local dates.
    fn cast_dates(&self, fields: &mut BTreeMap<String, FieldValue>) {
        let time = self.tenant.time();
        for spec in self.tenant.config().fields.iter().filter(|s| s.is_date) {
            if let Some(value) = fields.get_mut(&spec.key) {
                if let FieldValue::Int(ts) = *value {
                    *value = if ts == 0 {
                        FieldValue::Empty
                    } else {
                        FieldValue::Date(time.local_date(ts))
                    };
                }
            }
        }
    }

    fn outcome(
        model: &Arc<StageModel>,
        progress: &FunnelProgress,
        status_name: &str,
        price: Option<i64>,
    ) -> FunnelOutcome {
        let mut outcome = FunnelOutcome::new(Arc::clone(model));
        for (index, slot) in outcome.stages.iter_mut().enumerate() {
            slot.reached = progress.is_reached(index);
            slot.date = progress.date(index);
        }
        revenue::mark_alive(&mut outcome, status_name);
        revenue::apply_prices(&mut outcome, price);
        outcome
    }
}
