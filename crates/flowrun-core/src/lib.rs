//! flowrun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - An async runtime
//! - Network transport
//!
//! Everything here is shared by the channel bridge and the task runner.

pub mod error;
pub mod ids;
pub mod naming;
pub mod option;
pub mod status;
pub mod value;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{ContextId, DatasetId, TaskGroupId};
pub use naming::{external_input_channel_name, shard_channel_name, shard_name};
pub use option::{channel_capacity, parse_input_locations, TaskOption};
pub use status::{ChannelStatus, ChannelStatusSnapshot, ExecutorStatus, ExecutorStatusSnapshot};
pub use value::{Datum, ValueType};
