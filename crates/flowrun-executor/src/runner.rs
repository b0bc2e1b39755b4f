//! Runs one task group of a flow to completion.

use std::sync::Arc;

use chrono::Utc;
use flowrun_core::{ExecutorStatus, TaskOption};
use flowrun_netchan::ChannelBridge;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::error::RunnerError;
use crate::flow::FlowContext;
use crate::plan::{resolve_task_group, ChainGrouper, TaskGrouper};
use crate::wiring::{PipelineWirer, WiringReport};

/// How a call to [`TaskRunner::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The flow belongs to another context; nothing was done.
    NotResponsible,
    /// Every stage and adapter of the group finished.
    Completed(WiringReport),
}

/// Executes the task group selected by a [`TaskOption`].
pub struct TaskRunner {
    option: TaskOption,
    bridge: Arc<dyn ChannelBridge>,
    grouper: Arc<dyn TaskGrouper>,
    status: ExecutorStatus,
}

impl TaskRunner {
    /// Create a runner using the default chain grouping.
    pub fn new(option: TaskOption, bridge: Arc<dyn ChannelBridge>) -> Self {
        Self {
            option,
            bridge,
            grouper: Arc::new(ChainGrouper),
            status: ExecutorStatus::new(),
        }
    }

    /// Builder method to replace the task grouper.
    pub fn with_grouper(mut self, grouper: Arc<dyn TaskGrouper>) -> Self {
        self.grouper = grouper;
        self
    }

    pub fn option(&self) -> &TaskOption {
        &self.option
    }

    /// Status of the most recent run.
    pub fn status(&self) -> &ExecutorStatus {
        &self.status
    }

    /// True when the option names both a context and a task group.
    pub fn is_task_mode(&self) -> bool {
        self.option.is_task_mode()
    }

    /// Run this runner's task group of `fc`.
    ///
    /// Returns once every stage returned and every adapter and forwarder
    /// finished. A flow of another context is left untouched.
    ///
    /// An `Err` from wiring leaves the adapters spawned before the failure
    /// running and unawaited. Callers must treat it as fatal to the process.
    pub async fn run(&mut self, fc: &mut FlowContext) -> Result<RunOutcome, RunnerError> {
        if fc.id != self.option.context_id() {
            debug!(
                flow = %fc.id,
                expected = %self.option.context_id(),
                "Skipping flow of another context"
            );
            return Ok(RunOutcome::NotResponsible);
        }
        fc.channel_buffer_size = self.option.channel_buffer_size();

        let group = self.option.task_group_id();
        let mut tasks = resolve_task_group(self.grouper.as_ref(), fc, group)?;
        self.status.start_time = Some(Utc::now());

        info!(
            context = %fc.id,
            group = %group,
            stages = tasks.len(),
            "Starting task group"
        );

        let tracker = TaskTracker::new();
        let wired = PipelineWirer::new(
            &self.option,
            self.bridge.as_ref(),
            &tracker,
            fc.channel_buffer_size,
            &mut self.status,
        )
        .connect_inputs_and_outputs(&mut tasks)
        .await;
        let report = match wired {
            Ok(report) => report,
            Err(e) => {
                tracker.close();
                return Err(e.into());
            }
        };
        self.status.ready_time = Some(Utc::now());

        for task in tasks {
            tracker.spawn(async move {
                let name = task.name().to_string();
                match task.run().await {
                    Ok(()) => debug!(task = %name, "Stage finished"),
                    Err(e) => error!(task = %name, error = %e, "Stage failed"),
                }
            });
        }

        tracker.close();
        tracker.wait().await;
        self.status.stop_time = Some(Utc::now());

        info!(
            context = %fc.id,
            group = %group,
            duration_ms = self.status.duration_ms().unwrap_or_default(),
            "Task group finished"
        );
        Ok(RunOutcome::Completed(report))
    }
}
