//! Runtime stages and their shard channels.

use std::sync::Arc;

use flowrun_core::{channel_capacity, Datum};
use tokio::sync::mpsc;

use crate::error::{StageError, WiringError};
use crate::flow::{DatasetShard, StageLogic, TaskSpec};

/// The typed channel behind one shard slot.
///
/// Each end is handed out at most once. The channel closes when the one
/// sender is dropped by whoever owns it.
#[derive(Debug)]
pub struct ShardChannel {
    name: String,
    sender: Option<mpsc::Sender<Datum>>,
    receiver: Option<mpsc::Receiver<Datum>>,
}

impl ShardChannel {
    /// Open a new channel with both ends available.
    pub fn open(name: impl Into<String>, buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity(buffer_size));
        Self {
            name: name.into(),
            sender: Some(tx),
            receiver: Some(rx),
        }
    }

    /// Wrap a receiver whose sender is owned elsewhere.
    pub fn from_receiver(name: impl Into<String>, receiver: mpsc::Receiver<Datum>) -> Self {
        Self {
            name: name.into(),
            sender: None,
            receiver: Some(receiver),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the sending end; the caller becomes the channel's only writer.
    pub fn take_sender(&mut self) -> Result<mpsc::Sender<Datum>, WiringError> {
        self.sender.take().ok_or_else(|| WiringError::ShardAlreadySetUp {
            shard: self.name.clone(),
            end: "sending",
        })
    }

    /// Take the receiving end.
    pub fn take_receiver(&mut self) -> Result<mpsc::Receiver<Datum>, WiringError> {
        self.receiver.take().ok_or_else(|| WiringError::ShardAlreadySetUp {
            shard: self.name.clone(),
            end: "receiving",
        })
    }
}

/// A stage instantiated for one run, owning its slot channels.
pub struct Task {
    name: String,
    inputs: Vec<DatasetShard>,
    outputs: Vec<DatasetShard>,
    input_chans: Vec<ShardChannel>,
    output_chans: Vec<ShardChannel>,
    logic: Arc<dyn StageLogic>,
}

impl Task {
    /// Instantiate a task definition with fresh channels.
    pub fn new(spec: &TaskSpec, buffer_size: usize) -> Self {
        let open = |shards: &[DatasetShard]| -> Vec<ShardChannel> {
            shards
                .iter()
                .map(|shard| ShardChannel::open(shard.name(), buffer_size))
                .collect()
        };
        Self {
            name: spec.name.clone(),
            inputs: spec.inputs.clone(),
            outputs: spec.outputs.clone(),
            input_chans: open(&spec.inputs),
            output_chans: open(&spec.outputs),
            logic: Arc::clone(&spec.logic),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared input shards.
    pub fn inputs(&self) -> &[DatasetShard] {
        &self.inputs
    }

    /// Declared output shards.
    pub fn outputs(&self) -> &[DatasetShard] {
        &self.outputs
    }

    /// Number of channels the stage will read, declared or appended.
    pub fn input_channel_count(&self) -> usize {
        self.input_chans.len()
    }

    /// A stage without declared inputs reads from outside the pipeline.
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Take the feeding end of an input slot.
    pub fn feed_input(&mut self, slot: usize) -> Result<mpsc::Sender<Datum>, WiringError> {
        let task = &self.name;
        self.input_chans
            .get_mut(slot)
            .ok_or_else(|| WiringError::SlotOutOfRange {
                task: task.clone(),
                kind: "input",
                slot,
            })?
            .take_sender()
    }

    /// Take the reading end of an output slot.
    pub fn setup_reading(&mut self, slot: usize) -> Result<mpsc::Receiver<Datum>, WiringError> {
        let task = &self.name;
        self.output_chans
            .get_mut(slot)
            .ok_or_else(|| WiringError::SlotOutOfRange {
                task: task.clone(),
                kind: "output",
                slot,
            })?
            .take_receiver()
    }

    /// Append an input channel fed from outside the flow.
    pub fn push_input_channel(&mut self, channel: ShardChannel) {
        self.input_chans.push(channel);
    }

    /// Run the stage until its inputs are exhausted.
    ///
    /// Channel ends not handed out during wiring are dropped first, so an
    /// unwired input reads as closed.
    pub async fn run(mut self) -> Result<(), StageError> {
        let inputs = self
            .input_chans
            .iter_mut()
            .map(ShardChannel::take_receiver)
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = self
            .output_chans
            .iter_mut()
            .map(ShardChannel::take_sender)
            .collect::<Result<Vec<_>, _>>()?;
        let logic = Arc::clone(&self.logic);
        drop(self);

        logic.run(inputs, outputs).await
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("input_chans", &self.input_chans)
            .field("output_chans", &self.output_chans)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowContext;
    use crate::stages::RecordStage;
    use flowrun_core::ValueType;

    fn one_to_one_task() -> Task {
        let mut fc = FlowContext::new(1);
        let a = fc.add_dataset(ValueType::Text);
        let b = fc.add_dataset(ValueType::Text);
        let spec = TaskSpec::new("t", Arc::new(RecordStage::identity()))
            .with_input(a.shard(0))
            .with_output(b.shard(0));
        Task::new(&spec, 4)
    }

    #[test]
    fn test_channel_ends_handed_out_once() {
        let mut task = one_to_one_task();
        assert!(task.feed_input(0).is_ok());
        assert!(matches!(
            task.feed_input(0),
            Err(WiringError::ShardAlreadySetUp { end: "sending", .. })
        ));
        assert!(task.setup_reading(0).is_ok());
        assert!(matches!(
            task.setup_reading(0),
            Err(WiringError::ShardAlreadySetUp { end: "receiving", .. })
        ));
        assert!(matches!(
            task.setup_reading(3),
            Err(WiringError::SlotOutOfRange { kind: "output", slot: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_run_relays_and_closes() {
        let mut task = one_to_one_task();
        let feeder = task.feed_input(0).unwrap();
        let mut reader = task.setup_reading(0).unwrap();

        let handle = tokio::spawn(task.run());
        feeder.send(Datum::from("x")).await.unwrap();
        drop(feeder);

        assert_eq!(reader.recv().await, Some(Datum::from("x")));
        assert_eq!(reader.recv().await, None);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unwired_input_reads_as_closed() {
        let mut task = one_to_one_task();
        let mut reader = task.setup_reading(0).unwrap();

        task.run().await.unwrap();
        assert_eq!(reader.recv().await, None);
    }

    #[tokio::test]
    async fn test_source_task_reads_appended_channel() {
        let mut fc = FlowContext::new(1);
        let ds = fc.add_source_dataset(ValueType::Int64, 1);
        let spec = TaskSpec::new("src", Arc::new(RecordStage::identity())).with_output(ds.shard(0));
        let mut task = Task::new(&spec, 0);
        assert!(task.is_source());
        assert_eq!(task.input_channel_count(), 0);

        let (tx, rx) = mpsc::channel(1);
        task.push_input_channel(ShardChannel::from_receiver("ext", rx));
        assert_eq!(task.input_channel_count(), 1);
        let mut reader = task.setup_reading(0).unwrap();

        let handle = tokio::spawn(task.run());
        tx.send(Datum::from(9i64)).await.unwrap();
        drop(tx);
        assert_eq!(reader.recv().await, Some(Datum::from(9i64)));
        assert_eq!(reader.recv().await, None);
        handle.await.unwrap().unwrap();
    }
}
