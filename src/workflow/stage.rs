//! Pipeline stages and the transition table
//!
//! The pipeline topology is a closed graph: stages only move along
//! edges listed in [`next`]. Gates are stages of their own: a record
//! parked at a gate stays there until a human decision produces the
//! matching event.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stage in the workflow pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Dataset discovery and research planning
    Research,

    /// Local sanity check on the discovered dataset
    DatasetValidation,

    /// Parked: waiting for a human to approve or reject the dataset
    AwaitingDatasetDecision,

    /// EDA/cleaning code generation and schema capture
    DataEngineering,

    /// Parked: waiting for a human to approve or reject the schema
    AwaitingSchemaDecision,

    /// Training code generation
    MlEngineering,

    /// Sandbox execution with the self-heal loop
    Execution,

    /// Parked: waiting for the final satisfaction check
    AwaitingSatisfactionDecision,

    /// Terminal: user accepted the results
    Completed,

    /// Terminal: aborted or exhausted
    Failed,
}

/// Coarse status derived from the current stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    AwaitingDatasetDecision,
    AwaitingSchemaDecision,
    AwaitingSatisfactionDecision,
    Completed,
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::AwaitingDatasetDecision => "awaiting_dataset_decision",
            WorkflowStatus::AwaitingSchemaDecision => "awaiting_schema_decision",
            WorkflowStatus::AwaitingSatisfactionDecision => "awaiting_satisfaction_decision",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// The three human-decision pause points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Dataset,
    Schema,
    Satisfaction,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::Dataset => "dataset",
            GateKind::Schema => "schema",
            GateKind::Satisfaction => "satisfaction",
        }
    }
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GateKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dataset" => Ok(GateKind::Dataset),
            "schema" => Ok(GateKind::Schema),
            "satisfaction" => Ok(GateKind::Satisfaction),
            _ => Err(()),
        }
    }
}

/// A human decision supplied to a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
    Accept,
    Retry,
}

/// Events that drive stage transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// A working stage finished its job
    Completed,

    /// A working stage failed (collaborator error, exhausted retries)
    Failed,

    /// Gate decisions
    Approved,
    Rejected,
    Accepted,
    RetryRequested,
}

/// Attempted transition not present in the table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no transition from {stage:?} on {event:?}")]
pub struct InvalidTransition {
    pub stage: Stage,
    pub event: StageEvent,
}

impl Stage {
    /// The gate this stage is parked at, if any
    pub fn gate(&self) -> Option<GateKind> {
        match self {
            Stage::AwaitingDatasetDecision => Some(GateKind::Dataset),
            Stage::AwaitingSchemaDecision => Some(GateKind::Schema),
            Stage::AwaitingSatisfactionDecision => Some(GateKind::Satisfaction),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Derive the externally visible status
    pub fn status(&self) -> WorkflowStatus {
        match self {
            Stage::AwaitingDatasetDecision => WorkflowStatus::AwaitingDatasetDecision,
            Stage::AwaitingSchemaDecision => WorkflowStatus::AwaitingSchemaDecision,
            Stage::AwaitingSatisfactionDecision => WorkflowStatus::AwaitingSatisfactionDecision,
            Stage::Completed => WorkflowStatus::Completed,
            Stage::Failed => WorkflowStatus::Failed,
            _ => WorkflowStatus::Running,
        }
    }
}

impl GateKind {
    /// Map a decision to the event this gate emits
    ///
    /// Returns `None` when the decision does not belong to this gate
    /// (e.g. `accept` on the dataset gate).
    pub fn event_for(&self, decision: Decision) -> Option<StageEvent> {
        match (self, decision) {
            (GateKind::Dataset | GateKind::Schema, Decision::Approve) => Some(StageEvent::Approved),
            (GateKind::Dataset | GateKind::Schema, Decision::Reject) => Some(StageEvent::Rejected),
            (GateKind::Satisfaction, Decision::Accept) => Some(StageEvent::Accepted),
            (GateKind::Satisfaction, Decision::Retry) => Some(StageEvent::RetryRequested),
            _ => None,
        }
    }
}

/// Look up the next stage for `(stage, event)`
///
/// Pure table lookup. Pairs not listed here are a programming error
/// on the caller's side and are surfaced as [`InvalidTransition`].
pub fn next(stage: Stage, event: StageEvent) -> Result<Stage, InvalidTransition> {
    use Stage as S;
    use StageEvent as E;

    let next = match (stage, event) {
        (S::Research, E::Completed) => S::DatasetValidation,
        (S::DatasetValidation, E::Completed) => S::AwaitingDatasetDecision,

        (S::AwaitingDatasetDecision, E::Approved) => S::DataEngineering,
        // Loop-back: rejected dataset restarts discovery
        (S::AwaitingDatasetDecision, E::Rejected) => S::Research,

        (S::DataEngineering, E::Completed) => S::AwaitingSchemaDecision,

        (S::AwaitingSchemaDecision, E::Approved) => S::MlEngineering,
        // Schema rejection is an explicit abort
        (S::AwaitingSchemaDecision, E::Rejected) => S::Failed,

        (S::MlEngineering, E::Completed) => S::Execution,

        (S::Execution, E::Completed) => S::AwaitingSatisfactionDecision,

        (S::AwaitingSatisfactionDecision, E::Accepted) => S::Completed,
        // Loop-back: unsatisfied user re-runs from data engineering
        (S::AwaitingSatisfactionDecision, E::RetryRequested) => S::DataEngineering,

        // Any working stage may fail outright
        (
            S::Research
            | S::DatasetValidation
            | S::DataEngineering
            | S::MlEngineering
            | S::Execution,
            E::Failed,
        ) => S::Failed,

        (stage, event) => return Err(InvalidTransition { stage, event }),
    };

    Ok(next)
}
