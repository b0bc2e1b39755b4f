//! flowrun task group runner.
//!
//! Runs one task group of a flow as a chain of concurrently running stages:
//!
//! - `flow` - datasets, shards and task definitions
//! - `plan` - grouping tasks into chains
//! - `task` - stages instantiated for a run
//! - `wiring` - connecting stages to each other and to named channels
//! - `runner` - the [`TaskRunner`] entry point

pub mod config;
pub mod error;
pub mod flow;
pub mod flows;
pub mod json_output;
pub mod plan;
pub mod runner;
pub mod stages;
pub mod task;
pub mod wiring;

pub use error::{RunnerError, StageError, WiringError};
pub use flow::{Dataset, DatasetShard, FlowContext, StageLogic, TaskSpec};
pub use plan::{resolve_task_group, ChainGrouper, TaskGroupSpec, TaskGrouper};
pub use runner::{RunOutcome, TaskRunner};
pub use stages::RecordStage;
pub use task::{ShardChannel, Task};
pub use wiring::{PipelineWirer, WiringReport};
