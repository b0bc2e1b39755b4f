//! Grouping a flow's tasks into chains run by one worker each.

use std::collections::HashMap;

use flowrun_core::TaskGroupId;
use tracing::debug;

use crate::error::RunnerError;
use crate::flow::{FlowContext, TaskSpec};
use crate::task::Task;

/// An ordered chain of task definitions assigned to one worker.
#[derive(Debug, Clone)]
pub struct TaskGroupSpec {
    pub id: TaskGroupId,
    pub tasks: Vec<TaskSpec>,
}

/// Splits a flow into task groups.
pub trait TaskGrouper: Send + Sync {
    /// Group the flow's tasks; the result is indexed by group id.
    fn group_tasks(&self, fc: &FlowContext) -> Vec<TaskGroupSpec>;
}

/// Chains consecutive tasks linked one-to-one into the same group.
///
/// A task joins the previous task's group when its only input is the previous
/// task's only output and no other task reads that shard.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainGrouper;

impl TaskGrouper for ChainGrouper {
    fn group_tasks(&self, fc: &FlowContext) -> Vec<TaskGroupSpec> {
        let mut readers: HashMap<String, usize> = HashMap::new();
        for task in fc.tasks() {
            for shard in &task.inputs {
                *readers.entry(shard.name()).or_default() += 1;
            }
        }

        let mut groups: Vec<Vec<TaskSpec>> = Vec::new();
        let mut previous: Option<&TaskSpec> = None;
        for task in fc.tasks() {
            let chained = previous.is_some_and(|prev| match (&prev.outputs[..], &task.inputs[..]) {
                ([out], [input]) => out == input && readers.get(&out.name()) == Some(&1),
                _ => false,
            });
            match groups.last_mut() {
                Some(group) if chained => group.push(task.clone()),
                _ => groups.push(vec![task.clone()]),
            }
            previous = Some(task);
        }

        groups
            .into_iter()
            .enumerate()
            .map(|(i, tasks)| TaskGroupSpec {
                // Group ids are positional.
                id: TaskGroupId::new(i as i32),
                tasks,
            })
            .collect()
    }
}

/// Resolve one group of the flow into runnable tasks with fresh channels.
pub fn resolve_task_group(
    grouper: &dyn TaskGrouper,
    fc: &FlowContext,
    group_id: TaskGroupId,
) -> Result<Vec<Task>, RunnerError> {
    let groups = grouper.group_tasks(fc);
    let available = groups.len();
    let group = group_id
        .as_index()
        .and_then(|i| groups.into_iter().nth(i))
        .ok_or(RunnerError::TaskGroupNotFound {
            group: group_id,
            available,
        })?;
    if group.tasks.is_empty() {
        return Err(RunnerError::EmptyTaskGroup(group_id));
    }

    debug!(
        group = %group_id,
        tasks = ?group.tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "Resolved task group"
    );
    Ok(group
        .tasks
        .iter()
        .map(|spec| Task::new(spec, fc.channel_buffer_size))
        .collect())
}
