//! Batch runs over one tenant and one date range.

mod batch;

pub use batch::{BatchOptions, BatchOutput, BatchPipeline};
