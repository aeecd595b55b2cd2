//! Time conversion and phone helpers shared by the record builders.

pub mod phones;
pub mod timestamps;

pub use phones::{clear_phone, DialingCode, DialingCodes};
pub use timestamps::{host_offset_hours, monday_of, FetchWindow, TimeConverter};
