//! Lead qualification policy.

use std::collections::HashSet;
use std::fmt::Debug;

use super::config::TenantConfig;
use crate::model::RawLead;
use crate::record::OutputRecord;

/// Decides whether a lead counts as a lead and as a target lead.
///
/// Every tenant has one. [`ConfiguredPolicy`] covers tenants whose rules are
/// plain loss-reason lists; a tenant with extra rules implements the trait
/// and is attached through [`super::Tenant::with_policy`].
pub trait LeadPolicy: Send + Sync + Debug {
    /// Returns true unless the loss reason disqualifies the lead.
    fn is_lead_reason(&self, reason: &str) -> bool;

    /// Returns true if a lead lost for `reason` still counts as target.
    fn is_target_reason(&self, reason: &str) -> bool;

    /// Not removed and not disqualified by its loss reason.
    fn is_lead(&self, lead: &RawLead) -> bool {
        !lead.is_removed() && lead.loss_reason().map_or(true, |r| self.is_lead_reason(r))
    }

    /// A lead with no loss reason or a target-qualifying one.
    fn is_target(&self, lead: &RawLead, is_lead: bool) -> bool {
        is_lead
            && lead
                .loss_reason()
                .map_or(true, |r| r.is_empty() || self.is_target_reason(r))
    }

    /// Last hook before a built record leaves the builder.
    fn finalize(&self, _record: &mut OutputRecord) {}
}

/// Loss-reason sets taken from the tenant configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPolicy {
    not_lead: HashSet<String>,
    target: HashSet<String>,
}

impl ConfiguredPolicy {
    /// Creates a policy from explicit sets.
    #[must_use]
    pub fn new<I, J, S, T>(not_lead: I, target: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            not_lead: not_lead.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads both sets from a tenant configuration.
    #[must_use]
    pub fn from_config(config: &TenantConfig) -> Self {
        Self::new(
            config.not_lead_loss_reasons.iter().cloned(),
            config.target_loss_reasons.iter().cloned(),
        )
    }
}

impl LeadPolicy for ConfiguredPolicy {
    fn is_lead_reason(&self, reason: &str) -> bool {
        !self.not_lead.contains(reason)
    }

    fn is_target_reason(&self, reason: &str) -> bool {
        self.target.contains(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Deletion, LossReason};

    fn lead_lost_for(reason: &str) -> RawLead {
        let mut lead = RawLead::new(1, 1_700_000_000);
        lead.embedded.loss_reason.push(LossReason {
            name: reason.to_string(),
        });
        lead
    }

    fn policy() -> ConfiguredPolicy {
        ConfiguredPolicy::new(["SPAM", "Duplicate Lead"], ["Выбрал конкурента"])
    }

    #[test]
    fn test_not_lead_reasons() {
        let policy = policy();
        assert!(!policy.is_lead(&lead_lost_for("SPAM")));
        assert!(policy.is_lead(&lead_lost_for("Выбрал конкурента")));
        assert!(policy.is_lead(&RawLead::new(1, 0)));
    }

    #[test]
    fn test_removed_lead_is_not_lead() {
        let mut lead = RawLead::new(1, 0);
        lead.deleted = Some(Deletion::default());
        assert!(!policy().is_lead(&lead));

        let mut merged = RawLead::new(2, 0);
        merged.merged = true;
        assert!(!policy().is_lead(&merged));
    }

    #[test]
    fn test_target_requires_lead_and_target_reason() {
        let policy = policy();
        let open = RawLead::new(1, 0);
        assert!(policy.is_target(&open, true));
        assert!(!policy.is_target(&open, false));

        assert!(policy.is_target(&lead_lost_for("Выбрал конкурента"), true));
        assert!(!policy.is_target(&lead_lost_for("Нет денег"), true));
        assert!(policy.is_target(&lead_lost_for(""), true));
    }
}
