//! Flow model: datasets, shards, and task definitions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use flowrun_core::{shard_name, ContextId, DatasetId, Datum, ValueType};
use tokio::sync::mpsc;

use crate::error::StageError;

/// A dataset of one declared value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    id: DatasetId,
    context_id: ContextId,
    value_type: ValueType,
    external_input_count: usize,
}

impl Dataset {
    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Number of channels an external producer feeds into this dataset.
    pub fn external_input_count(&self) -> usize {
        self.external_input_count
    }

    /// Get one shard of this dataset.
    pub fn shard(self: &Arc<Self>, index: u32) -> DatasetShard {
        DatasetShard {
            dataset: Arc::clone(self),
            index,
        }
    }
}

/// One input or output slot of a stage, tied to a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetShard {
    dataset: Arc<Dataset>,
    index: u32,
}

impl DatasetShard {
    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn value_type(&self) -> ValueType {
        self.dataset.value_type
    }

    /// Stable name used to derive channel endpoint names.
    pub fn name(&self) -> String {
        shard_name(self.dataset.context_id, self.dataset.id, self.index)
    }
}

/// The per-record logic of a stage.
///
/// `run` returns once every input is exhausted and every output written.
/// Returning drops the output senders, which closes them for downstream.
#[async_trait]
pub trait StageLogic: Send + Sync {
    async fn run(
        &self,
        inputs: Vec<mpsc::Receiver<Datum>>,
        outputs: Vec<mpsc::Sender<Datum>>,
    ) -> Result<(), StageError>;
}

/// Definition of a stage within a flow.
#[derive(Clone)]
pub struct TaskSpec {
    pub name: String,
    pub inputs: Vec<DatasetShard>,
    pub outputs: Vec<DatasetShard>,
    pub logic: Arc<dyn StageLogic>,
}

impl TaskSpec {
    /// Create a task with no slots yet.
    pub fn new(name: impl Into<String>, logic: Arc<dyn StageLogic>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            logic,
        }
    }

    /// Builder method to add an input slot.
    pub fn with_input(mut self, shard: DatasetShard) -> Self {
        self.inputs.push(shard);
        self
    }

    /// Builder method to add an output slot.
    pub fn with_output(mut self, shard: DatasetShard) -> Self {
        self.outputs.push(shard);
        self
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// The logical job graph a worker participates in.
#[derive(Debug)]
pub struct FlowContext {
    pub id: ContextId,
    pub channel_buffer_size: usize,
    datasets: Vec<Arc<Dataset>>,
    tasks: Vec<TaskSpec>,
}

impl FlowContext {
    /// Create an empty flow.
    pub fn new(id: impl Into<ContextId>) -> Self {
        Self {
            id: id.into(),
            channel_buffer_size: 0,
            datasets: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Declare a dataset produced by a stage of this flow.
    pub fn add_dataset(&mut self, value_type: ValueType) -> Arc<Dataset> {
        self.add_source_dataset(value_type, 0)
    }

    /// Declare a dataset fed by `external_inputs` channels from outside the flow.
    pub fn add_source_dataset(
        &mut self,
        value_type: ValueType,
        external_inputs: usize,
    ) -> Arc<Dataset> {
        // Ids are positional.
        let id = DatasetId::new(self.datasets.len() as u32);
        let dataset = Arc::new(Dataset {
            id,
            context_id: self.id,
            value_type,
            external_input_count: external_inputs,
        });
        self.datasets.push(Arc::clone(&dataset));
        dataset
    }

    /// Append a task; tasks are kept in the order they were added.
    pub fn add_task(&mut self, task: TaskSpec) {
        self.tasks.push(task);
    }

    pub fn datasets(&self) -> &[Arc<Dataset>] {
        &self.datasets
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }
}
