//! Task runner options.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ContextId, CoreError, TaskGroupId};

/// Identifies which flow context and task group this process runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOption {
    context_id: ContextId,
    task_group_id: TaskGroupId,
    executable_file_hash: String,
    inputs: String,
    channel_buffer_size: usize,
}

impl TaskOption {
    /// Create options for running one task group of one flow context.
    pub fn new(context_id: impl Into<ContextId>, task_group_id: impl Into<TaskGroupId>) -> Self {
        Self {
            context_id: context_id.into(),
            task_group_id: task_group_id.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the job fingerprint used to namespace channel names.
    pub fn with_executable_file_hash(mut self, hash: impl Into<String>) -> Self {
        self.executable_file_hash = hash.into();
        self
    }

    /// Builder method to set the comma-separated `name@location` input list.
    pub fn with_inputs(mut self, inputs: impl Into<String>) -> Self {
        self.inputs = inputs.into();
        self
    }

    /// Builder method to set the channel buffer size.
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn task_group_id(&self) -> TaskGroupId {
        self.task_group_id
    }

    pub fn executable_file_hash(&self) -> &str {
        &self.executable_file_hash
    }

    pub fn inputs(&self) -> &str {
        &self.inputs
    }

    pub fn channel_buffer_size(&self) -> usize {
        self.channel_buffer_size
    }

    /// Returns true if this process was launched to run a task group.
    pub fn is_task_mode(&self) -> bool {
        self.task_group_id.is_set() && self.context_id.is_set()
    }

    /// Parse the inputs list into a channel name to location mapping.
    pub fn input_locations(&self) -> Result<HashMap<String, String>, CoreError> {
        parse_input_locations(&self.inputs)
    }
}

/// Split a comma-separated `name@location` list into a mapping.
///
/// Each entry is split on its first `@`. Empty entries are ignored; entries
/// are not trimmed, so names must match channel names byte for byte.
pub fn parse_input_locations(inputs: &str) -> Result<HashMap<String, String>, CoreError> {
    let mut locations = HashMap::new();
    for entry in inputs.split(',').filter(|e| !e.is_empty()) {
        let (name, location) = entry
            .split_once('@')
            .ok_or_else(|| CoreError::InvalidInputLocation(entry.to_string()))?;
        locations.insert(name.to_string(), location.to_string());
    }
    Ok(locations)
}

/// Capacity for a bounded channel given a configured buffer size.
///
/// A zero buffer means hand-off with no slack; tokio channels need at least one slot.
pub fn channel_capacity(buffer_size: usize) -> usize {
    buffer_size.max(1)
}
