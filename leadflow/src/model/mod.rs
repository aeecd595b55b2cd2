//! Read-only input model: leads, their timelines and reference dictionaries.

mod lead;
mod reference;
mod timeline;

pub use lead::{
    value_is_truthy, value_text, Contact, CustomField, CustomValue, Deletion, Embedded,
    LossReason, RawLead, Tag,
};
pub use reference::{Pipeline, PipelineDirectory, ReferenceData, User, UserDirectory};
pub use timeline::{
    CallDuration, ChatMessage, Event, EventKind, EventValue, Note, NoteKind, NoteParams,
    StatusRef, Task,
};
