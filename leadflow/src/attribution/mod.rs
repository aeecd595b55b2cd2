//! Marketing attribution: utm fields, referer parsing and tenant rules.

mod resolver;
mod rules;

pub use resolver::{canonical_key, Attribution, AttributionResolver, RAW_UTM_KEYS};
pub use rules::{AttributionRule, RuleTerm};
