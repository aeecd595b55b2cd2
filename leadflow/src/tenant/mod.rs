//! Tenants: configuration as data, lead policy and the registry.
//!
//! A [`TenantConfig`] is plain serde data. [`Tenant::new`] validates it and
//! prepares the clock, funnels, attribution resolver and [`LeadPolicy`].
//! Tenants are registered in a [`TenantRegistry`] the caller owns and passes
//! to the pipeline.

mod config;
mod fields;
mod policy;
pub mod presets;
mod registry;

pub use config::{CountryConfig, MilestoneWindow, OfferSpeedRule, TenantConfig};
pub use fields::FieldSpec;
pub use policy::{ConfiguredPolicy, LeadPolicy};
pub use registry::{Tenant, TenantRegistry};
