//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a flow context (one logical job graph).
///
/// Negative values mean "unset": the process was not launched to run a task group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(i32);

impl ContextId {
    /// Create a new ContextId.
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn get(&self) -> i32 {
        self.0
    }

    /// Returns true if the id was explicitly assigned.
    pub fn is_set(&self) -> bool {
        self.0 >= 0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self(-1)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ContextId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// Identifier of a task group within a flow context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskGroupId(i32);

impl TaskGroupId {
    /// Create a new TaskGroupId.
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn get(&self) -> i32 {
        self.0
    }

    /// Returns true if the id was explicitly assigned.
    pub fn is_set(&self) -> bool {
        self.0 >= 0
    }

    /// Position of this group in a grouping result, if the id is set.
    pub fn as_index(&self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl Default for TaskGroupId {
    fn default() -> Self {
        Self(-1)
    }
}

impl fmt::Display for TaskGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for TaskGroupId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// Identifier of a dataset within a flow context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId(u32);

impl DatasetId {
    /// Create a new DatasetId.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DatasetId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
