//! Cooperative cancellation of batch runs.

mod token;

pub use token::CancellationToken;
