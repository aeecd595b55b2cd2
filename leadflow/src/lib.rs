//! # Leadflow
//!
//! Funnel-stage classification and manager reaction-time analysis for CRM
//! lead exports.
//!
//! For every lead of a tenant's account, leadflow produces one flat record:
//!
//! - **Funnel stages**: which stages of each configured funnel the lead
//!   reached, when, and whether it is still alive in them
//! - **Attribution**: a canonical traffic source resolved from utm values
//! - **Reaction time**: how fast a manager first reacted, bucketed by duty
//!   time and channel
//! - **Batch passes**: creation-time sanity flags, country by phone and
//!   weekly alignment of date columns
//!
//! Data gaps never abort a run. They are reported through a
//! [`events::DiagnosticSink`] and counted in the batch summary.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leadflow::prelude::*;
//!
//! let registry = TenantRegistry::new();
//! registry.register_config(leadflow::tenant::presets::swiss_medica()?)?;
//!
//! let source = Arc::new(StaticLeadSource::new(leads, refs));
//! let output = BatchPipeline::from_registry(&registry, "swiss_medica", source)?
//!     .with_options(BatchOptions::new().with_weekly(true))
//!     .run(date_from, date_to)
//!     .await?;
//! println!("{}", output.to_json()?);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod attribution;
pub mod builder;
pub mod cancellation;
pub mod errors;
pub mod events;
pub mod fetch;
pub mod funnel;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod reaction;
pub mod record;
pub mod tenant;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::attribution::{Attribution, AttributionResolver, AttributionRule};
    pub use crate::builder::{LeadRecordBuilder, PendingLead};
    pub use crate::cancellation::CancellationToken;
    pub use crate::errors::{ConfigError, FetchError, LeadflowError};
    pub use crate::events::{
        CollectingSink, CountingSink, DataGap, DataGapKind, DiagnosticSink, LoggingSink, NoOpSink,
    };
    pub use crate::fetch::{CrmLeadSource, LeadSource, RetryPolicy, StaticLeadSource};
    pub use crate::funnel::{Stage, StageModel};
    pub use crate::model::{RawLead, ReferenceData};
    pub use crate::observability::{init_tracing, BatchSummary, LogConfig};
    pub use crate::pipeline::{BatchOptions, BatchOutput, BatchPipeline};
    pub use crate::reaction::{DutySchedule, ReactionAnalyzer};
    pub use crate::record::{FieldValue, OutputRecord, Row};
    pub use crate::tenant::{Tenant, TenantConfig, TenantRegistry};
    pub use crate::utils::TimeConverter;
    pub use std::sync::Arc;
}
