//! Validated tenants and the registry that selects them by name.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::config::TenantConfig;
use super::policy::{ConfiguredPolicy, LeadPolicy};
use crate::attribution::AttributionResolver;
use crate::errors::{ConfigError, LeadflowError};
use crate::funnel::StageModel;
use crate::utils::TimeConverter;

/// A tenant configuration checked and prepared for building records.
#[derive(Debug, Clone)]
pub struct Tenant {
    config: TenantConfig,
    time: TimeConverter,
    models: Vec<Arc<StageModel>>,
    attribution: AttributionResolver,
    policy: Arc<dyn LeadPolicy>,
}

impl Tenant {
    /// Validates `config` and derives the runtime helpers.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found by [`TenantConfig::validate`]
    /// or an invalid UTC offset.
    pub fn new(config: TenantConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let time = TimeConverter::new(config.utc_offset_hours)?;
        let models = config.models.iter().cloned().map(Arc::new).collect();
        let attribution = AttributionResolver::new(config.attribution_rules.clone());
        let policy: Arc<dyn LeadPolicy> = Arc::new(ConfiguredPolicy::from_config(&config));
        debug!(
            tenant = %config.name,
            funnels = config.models.len(),
            fields = config.fields.len(),
            rules = config.attribution_rules.len(),
            "Tenant prepared"
        );
        Ok(Self {
            config,
            time,
            models,
            attribution,
            policy,
        })
    }

    /// Replaces the loss-reason policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn LeadPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the time converter, e.g. to pin the host offset.
    #[must_use]
    pub const fn with_time(mut self, time: TimeConverter) -> Self {
        self.time = time;
        self
    }

    /// Registry identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &TenantConfig {
        &self.config
    }

    /// Tenant clock.
    #[must_use]
    pub const fn time(&self) -> &TimeConverter {
        &self.time
    }

    /// All funnels, primary first.
    #[must_use]
    pub fn models(&self) -> &[Arc<StageModel>] {
        &self.models
    }

    /// The first funnel.
    #[must_use]
    pub fn primary_model(&self) -> &Arc<StageModel> {
        // validate() guarantees at least one model
        &self.models[0]
    }

    /// Attribution resolver over the tenant's rules.
    #[must_use]
    pub const fn attribution(&self) -> &AttributionResolver {
        &self.attribution
    }

    /// Lead qualification policy.
    #[must_use]
    pub fn policy(&self) -> &dyn LeadPolicy {
        self.policy.as_ref()
    }

    /// CRM link for a lead.
    #[must_use]
    pub fn link_for(&self, lead_id: i64) -> String {
        format!(
            "https://{}.amocrm.ru/leads/detail/{lead_id}",
            self.config.subdomain
        )
    }
}

/// Tenants keyed by name, built by the caller and handed to the pipeline.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    tenants: RwLock<HashMap<String, Arc<Tenant>>>,
}

impl TenantRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tenant, replacing any previous one with the same name.
    pub fn register(&self, tenant: Tenant) -> Arc<Tenant> {
        let tenant = Arc::new(tenant);
        self.tenants
            .write()
            .insert(tenant.name().to_string(), Arc::clone(&tenant));
        tenant
    }

    /// Validates a configuration and registers the resulting tenant.
    ///
    /// # Errors
    ///
    /// See [`Tenant::new`].
    pub fn register_config(&self, config: TenantConfig) -> Result<Arc<Tenant>, ConfigError> {
        Ok(self.register(Tenant::new(config)?))
    }

    /// Looks up a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`LeadflowError::UnknownTenant`] when nothing is registered
    /// under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<Tenant>, LeadflowError> {
        self.tenants
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LeadflowError::UnknownTenant(name.to_string()))
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tenants.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }
}
