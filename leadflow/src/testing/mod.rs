//! Test helpers: lead and reference-data builders plus record assertions.

mod assertions;
mod fixtures;

pub use assertions::{assert_column, assert_reached, assert_stage_not_reached, assert_stage_reached};
pub use fixtures::{LeadFixture, ReferenceFixture};
