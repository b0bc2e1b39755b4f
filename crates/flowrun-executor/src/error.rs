//! Error types for the task group runner.

use flowrun_core::{CoreError, TaskGroupId};
use flowrun_netchan::BridgeError;
use thiserror::Error;

/// Errors connecting a task group's channels.
#[derive(Debug, Error)]
pub enum WiringError {
    /// A channel endpoint could not be resolved.
    #[error("Failed to resolve channel: {0}")]
    Bridge(#[from] BridgeError),

    /// The task inputs could not be parsed.
    #[error("Invalid task inputs: {0}")]
    InvalidInputs(#[from] CoreError),

    /// Adjacent stages whose slot counts cannot be chained.
    #[error("Cannot chain '{upstream}' ({outputs} outputs) into '{downstream}' ({inputs} inputs)")]
    ArityMismatch {
        upstream: String,
        downstream: String,
        outputs: usize,
        inputs: usize,
    },

    /// A shard channel end was requested twice.
    #[error("The {end} end of shard '{shard}' is already set up")]
    ShardAlreadySetUp { shard: String, end: &'static str },

    /// A slot index beyond the stage's declared slots.
    #[error("Stage '{task}' has no {kind} slot {slot}")]
    SlotOutOfRange {
        task: String,
        kind: &'static str,
        slot: usize,
    },

    /// A source stage that declares no output dataset.
    #[error("Source stage '{0}' declares no output")]
    SourceWithoutOutput(String),
}

/// Errors raised by a stage while running.
#[derive(Debug, Error)]
pub enum StageError {
    /// Every downstream reader went away.
    #[error("All outputs of stage '{0}' are closed")]
    OutputClosed(String),

    /// The stage's channels were not in a runnable state.
    #[error("Stage setup failed: {0}")]
    Setup(#[from] WiringError),
}

/// Errors that abort a task group run.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The flow has no group with the requested id.
    #[error("Task group {group} not found ({available} groups available)")]
    TaskGroupNotFound { group: TaskGroupId, available: usize },

    /// The requested group contains no stages.
    #[error("Task group {0} is empty")]
    EmptyTaskGroup(TaskGroupId),

    /// Channel wiring failed; the process cannot continue half-wired.
    #[error("Wiring failed: {0}")]
    Wiring(#[from] WiringError),
}

impl RunnerError {
    /// Returns true if the failure came from resolving a channel endpoint.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::Wiring(WiringError::Bridge(_)))
    }
}
