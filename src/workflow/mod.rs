//! Workflow state machine, store, and engine

mod engine;
mod heal;
mod record;
mod stage;
mod store;

pub use engine::{Engine, EngineError, EngineSettings};
pub use record::{ArtifactKind, DatasetInfo, WorkflowRecord};
pub use stage::{Decision, GateKind, Stage, WorkflowStatus};
pub use store::WorkflowStore;
