//! Funnel definitions and stage-reach classification.

mod history;
mod progress;
mod stage;

pub use history::{
    FunnelClassifier, HistoryOutcome, Resurrection, SeenStatus, StatusEntry, StatusLabels,
};
pub use progress::FunnelProgress;
pub use stage::{Stage, StageModel, StageModelSpec, SYSTEM_STAGE_KEYS};
