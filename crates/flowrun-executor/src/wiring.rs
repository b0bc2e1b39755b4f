//! Connecting a task group's channels into one pipeline.
//!
//! Wiring runs in four phases, in this order:
//!
//! 1. external input channels of a source stage
//! 2. external data inputs of the first stage
//! 3. internal hops between adjacent stages
//! 4. external outputs of the last stage
//!
//! Every background unit spawned here is registered with the run's tracker.
//! Each hop has exactly one writer, which closes it by dropping its sender
//! after relaying the last value.

use std::collections::HashMap;

use flowrun_core::{
    channel_capacity, external_input_channel_name, shard_channel_name, Datum, ExecutorStatus,
    TaskOption,
};
use flowrun_netchan::{connect_raw_read_to_typed, connect_typed_write_to_raw, ChannelBridge};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::WiringError;
use crate::task::{ShardChannel, Task};

/// What wiring spawned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WiringReport {
    /// Forwarders between adjacent stages.
    pub internal_forwarders: usize,
    /// Decode and encode adapters at the group's boundary.
    pub external_adapters: usize,
}

/// Wires a resolved task group. Borrowed by the runner for one run.
pub struct PipelineWirer<'a> {
    option: &'a TaskOption,
    bridge: &'a dyn ChannelBridge,
    tracker: &'a TaskTracker,
    buffer_size: usize,
    status: &'a mut ExecutorStatus,
    report: WiringReport,
}

impl<'a> PipelineWirer<'a> {
    pub fn new(
        option: &'a TaskOption,
        bridge: &'a dyn ChannelBridge,
        tracker: &'a TaskTracker,
        buffer_size: usize,
        status: &'a mut ExecutorStatus,
    ) -> Self {
        Self {
            option,
            bridge,
            tracker,
            buffer_size,
            status,
            report: WiringReport::default(),
        }
    }

    /// Run all four phases over `tasks`.
    pub async fn connect_inputs_and_outputs(
        mut self,
        tasks: &mut [Task],
    ) -> Result<WiringReport, WiringError> {
        if tasks.is_empty() {
            return Ok(self.report);
        }
        let locations = self.option.input_locations()?;

        self.connect_external_input_channels(&mut tasks[0]).await?;
        self.connect_external_inputs(&mut tasks[0], &locations)
            .await?;
        self.connect_internal_inputs_and_outputs(tasks)?;
        if let Some(last) = tasks.last_mut() {
            self.connect_external_outputs(last).await?;
        }

        info!(
            forwarders = self.report.internal_forwarders,
            adapters = self.report.external_adapters,
            "Task group wired"
        );
        Ok(self.report)
    }

    /// Phase 1: feed a source stage from the external inputs of its dataset.
    async fn connect_external_input_channels(&mut self, first: &mut Task) -> Result<(), WiringError> {
        if !first.is_source() {
            return Ok(());
        }
        let dataset = first
            .outputs()
            .first()
            .map(|shard| shard.dataset().clone())
            .ok_or_else(|| WiringError::SourceWithoutOutput(first.name().to_string()))?;

        for i in 0..dataset.external_input_count() {
            let name = external_input_channel_name(
                self.option.executable_file_hash(),
                self.option.context_id(),
                dataset.id(),
                i,
            );
            let raw = self
                .bridge
                .resolve_local_read(&name, self.buffer_size, self.tracker)
                .await?;
            let (tx, rx) = mpsc::channel::<Datum>(channel_capacity(self.buffer_size));
            let status =
                connect_raw_read_to_typed(&name, raw, tx, dataset.value_type(), self.tracker);
            self.status.input_channel_statuses.push(status);
            first.push_input_channel(ShardChannel::from_receiver(name.clone(), rx));
            self.report.external_adapters += 1;
            debug!(task = %first.name(), channel = %name, "Connected external input channel");
        }
        Ok(())
    }

    /// Phase 2: feed the first stage's declared inputs from named channels.
    async fn connect_external_inputs(
        &mut self,
        first: &mut Task,
        locations: &HashMap<String, String>,
    ) -> Result<(), WiringError> {
        let shards = first.inputs().to_vec();
        for (slot, shard) in shards.iter().enumerate() {
            let name = shard_channel_name(self.option.executable_file_hash(), &shard.name());
            let location = locations.get(&name).map(String::as_str);
            let raw = self
                .bridge
                .resolve_read(&name, location, self.buffer_size, self.tracker)
                .await?;
            let typed = first.feed_input(slot)?;
            let status =
                connect_raw_read_to_typed(&name, raw, typed, shard.value_type(), self.tracker);
            self.status.input_channel_statuses.push(status);
            self.report.external_adapters += 1;
            debug!(
                task = %first.name(),
                channel = %name,
                location = location.unwrap_or(""),
                "Connected external input"
            );
        }
        Ok(())
    }

    /// Phase 3: relay each stage's output into the next stage's input.
    fn connect_internal_inputs_and_outputs(&mut self, tasks: &mut [Task]) -> Result<(), WiringError> {
        for i in 1..tasks.len() {
            let (head, tail) = tasks.split_at_mut(i);
            let (current, next) = (&mut head[i - 1], &mut tail[0]);
            let slots = chained_slot_count(current, next)?;

            for slot in 0..slots {
                // The upstream end must be taken before the forwarder exists.
                let upstream = current.setup_reading(slot)?;
                let downstream = next.feed_input(slot)?;
                let hop = current.outputs()[slot].name();
                self.tracker.spawn(forward(hop, upstream, downstream));
                self.report.internal_forwarders += 1;
            }
        }
        Ok(())
    }

    /// Phase 4: expose the last stage's outputs as named channels.
    async fn connect_external_outputs(&mut self, last: &mut Task) -> Result<(), WiringError> {
        let shards = last.outputs().to_vec();
        for (slot, shard) in shards.iter().enumerate() {
            let name = shard_channel_name(self.option.executable_file_hash(), &shard.name());
            let raw = self.bridge.resolve_local_write(&name, self.tracker).await?;
            let typed = last.setup_reading(slot)?;
            let status =
                connect_typed_write_to_raw(&name, typed, raw, shard.value_type(), self.tracker);
            if self.status.output_channel_status.replace(status).is_some() {
                debug!(channel = %name, "Replacing output channel status");
            }
            self.report.external_adapters += 1;
            debug!(task = %last.name(), channel = %name, "Connected external output");
        }
        Ok(())
    }
}

/// Number of slots to chain between two adjacent stages.
///
/// One output into one input is the usual shape; equal counts are paired slot
/// by slot.
fn chained_slot_count(current: &Task, next: &Task) -> Result<usize, WiringError> {
    let outputs = current.outputs().len();
    let inputs = next.inputs().len();
    if outputs == 0 || outputs != inputs {
        return Err(WiringError::ArityMismatch {
            upstream: current.name().to_string(),
            downstream: next.name().to_string(),
            outputs,
            inputs,
        });
    }
    Ok(outputs)
}

/// Relay values in order, then close the downstream side.
async fn forward(hop: String, mut upstream: mpsc::Receiver<Datum>, downstream: mpsc::Sender<Datum>) {
    let mut count = 0u64;
    while let Some(datum) = upstream.recv().await {
        if downstream.send(datum).await.is_err() {
            warn!(hop = %hop, count, "Downstream stage stopped reading");
            break;
        }
        count += 1;
    }
    drop(downstream);
    debug!(hop = %hop, count, "Forwarder finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowContext, TaskSpec};
    use crate::plan::{resolve_task_group, ChainGrouper};
    use crate::stages::RecordStage;
    use flowrun_core::{TaskGroupId, ValueType};
    use flowrun_netchan::{BridgeError, MemoryBridge, RawReceiver};
    use std::sync::Arc;

    fn identity(name: &str) -> TaskSpec {
        TaskSpec::new(name, Arc::new(RecordStage::identity()))
    }

    /// source -> a -> b, fed by two external inputs.
    fn source_flow() -> FlowContext {
        let mut fc = FlowContext::new(7);
        let src = fc.add_source_dataset(ValueType::Int64, 2);
        let mid = fc.add_dataset(ValueType::Int64);
        let out = fc.add_dataset(ValueType::Int64);
        fc.add_task(identity("source").with_output(src.shard(0)));
        fc.add_task(identity("a").with_input(src.shard(0)).with_output(mid.shard(0)));
        fc.add_task(identity("b").with_input(mid.shard(0)).with_output(out.shard(0)));
        fc
    }

    async fn drain(mut rx: RawReceiver) -> Vec<i64> {
        let mut values = Vec::new();
        while let Some(bytes) = rx.recv().await {
            values.push(i64::from_be_bytes(bytes.try_into().unwrap()));
        }
        values
    }

    #[tokio::test]
    async fn test_source_group_wiring_counts() {
        let fc = source_flow();
        let mut tasks = resolve_task_group(&ChainGrouper, &fc, TaskGroupId::new(0)).unwrap();
        let option = TaskOption::new(7, 0).with_executable_file_hash("h");
        let bridge = MemoryBridge::new();
        let tracker = TaskTracker::new();
        let mut status = ExecutorStatus::new();

        let report = PipelineWirer::new(&option, &bridge, &tracker, 2, &mut status)
            .connect_inputs_and_outputs(&mut tasks)
            .await
            .unwrap();

        assert_eq!(report.internal_forwarders, 2);
        assert_eq!(report.external_adapters, 3);
        assert_eq!(tasks[0].input_channel_count(), 2);
        assert_eq!(status.input_channel_statuses.len(), 2);
        assert_eq!(status.input_channel_statuses[1].name(), "h-ct-7-input-0-p-1");
        assert_eq!(
            status.output_channel_status.as_ref().unwrap().name(),
            "h-ct-7-ds-2-shard-0"
        );

        // Feed both external inputs and run the stages by hand.
        let out = bridge.claim_receiver("h-ct-7-ds-2-shard-0", 4).await.unwrap();
        for (p, values) in [(0, vec![1i64, 2]), (1, vec![3i64])] {
            let tx = bridge
                .claim_sender(&format!("h-ct-7-input-0-p-{}", p))
                .await
                .unwrap();
            for v in values {
                tx.send(v.to_be_bytes().to_vec()).await.unwrap();
            }
        }
        for task in tasks {
            tracker.spawn(async move { task.run().await.unwrap() });
        }
        tracker.close();

        let mut values = drain(out).await;
        tracker.wait().await;
        values.sort();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_locations_route_to_remote_read() {
        let mut fc = FlowContext::new(1);
        let upstream = fc.add_dataset(ValueType::Text);
        let out = fc.add_dataset(ValueType::Text);
        fc.add_task(identity("t").with_input(upstream.shard(0)).with_output(out.shard(0)));
        let mut tasks = resolve_task_group(&ChainGrouper, &fc, TaskGroupId::new(0)).unwrap();

        let option = TaskOption::new(1, 0)
            .with_executable_file_hash("h")
            .with_inputs("h-ct-1-ds-0-shard-0@10.0.0.2:8930");
        let bridge = MemoryBridge::new();
        let tracker = TaskTracker::new();
        let mut status = ExecutorStatus::new();

        let report = PipelineWirer::new(&option, &bridge, &tracker, 0, &mut status)
            .connect_inputs_and_outputs(&mut tasks)
            .await
            .unwrap();

        assert_eq!(report, WiringReport { internal_forwarders: 0, external_adapters: 2 });
        assert_eq!(
            bridge.channel_names().await,
            vec!["h-ct-1-ds-0-shard-0".to_string(), "h-ct-1-ds-1-shard-0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_arity_mismatch() {
        let mut fc = FlowContext::new(0);
        let a = fc.add_dataset(ValueType::Text);
        let b = fc.add_dataset(ValueType::Text);
        let c = fc.add_dataset(ValueType::Text);
        let mut tasks: Vec<Task> = [
            identity("two-out").with_input(a.shard(0)).with_output(b.shard(0)).with_output(b.shard(1)),
            identity("one-in").with_input(b.shard(0)).with_output(c.shard(0)),
        ]
        .iter()
        .map(|spec| Task::new(spec, 1))
        .collect();

        let option = TaskOption::new(0, 0);
        let bridge = MemoryBridge::new();
        let tracker = TaskTracker::new();
        let mut status = ExecutorStatus::new();
        let err = PipelineWirer::new(&option, &bridge, &tracker, 1, &mut status)
            .connect_inputs_and_outputs(&mut tasks)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WiringError::ArityMismatch { outputs: 2, inputs: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_resolution_failure_is_reported() {
        let fc = source_flow();
        let mut tasks = resolve_task_group(&ChainGrouper, &fc, TaskGroupId::new(0)).unwrap();
        let option = TaskOption::new(7, 0).with_executable_file_hash("h");
        let bridge = MemoryBridge::new();
        // Someone else already reads the first external input.
        let _taken = bridge.claim_receiver("h-ct-7-input-0-p-0", 1).await.unwrap();

        let tracker = TaskTracker::new();
        let mut status = ExecutorStatus::new();
        let err = PipelineWirer::new(&option, &bridge, &tracker, 1, &mut status)
            .connect_inputs_and_outputs(&mut tasks)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WiringError::Bridge(BridgeError::AlreadyClaimed { .. })
        ));
        assert!(status.input_channel_statuses.is_empty());
    }

    #[tokio::test]
    async fn test_forward_relays_in_order_then_closes() {
        let (up_tx, up_rx) = mpsc::channel(8);
        let (down_tx, mut down_rx) = mpsc::channel(8);
        for v in 0..5i64 {
            up_tx.send(Datum::from(v)).await.unwrap();
        }
        drop(up_tx);

        forward("hop".to_string(), up_rx, down_tx).await;

        for v in 0..5i64 {
            assert_eq!(down_rx.recv().await, Some(Datum::from(v)));
        }
        assert_eq!(down_rx.recv().await, None);
    }

    /// Relays input slot `i` to output slot `i`, one slot after another.
    struct Slotwise;

    #[async_trait::async_trait]
    impl crate::flow::StageLogic for Slotwise {
        async fn run(
            &self,
            inputs: Vec<mpsc::Receiver<Datum>>,
            outputs: Vec<mpsc::Sender<Datum>>,
        ) -> Result<(), crate::error::StageError> {
            for (mut rx, tx) in inputs.into_iter().zip(outputs) {
                while let Some(datum) = rx.recv().await {
                    tx.send(datum)
                        .await
                        .map_err(|_| crate::error::StageError::OutputClosed("slotwise".into()))?;
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_multi_slot_stages_chain_slot_by_slot() {
        let mut fc = FlowContext::new(5);
        let a = fc.add_dataset(ValueType::Int64);
        let b = fc.add_dataset(ValueType::Int64);
        let c = fc.add_dataset(ValueType::Int64);
        let specs = [
            TaskSpec::new("first", Arc::new(Slotwise))
                .with_input(a.shard(0))
                .with_input(a.shard(1))
                .with_output(b.shard(0))
                .with_output(b.shard(1)),
            TaskSpec::new("second", Arc::new(Slotwise))
                .with_input(b.shard(0))
                .with_input(b.shard(1))
                .with_output(c.shard(0))
                .with_output(c.shard(1)),
        ];
        let mut tasks: Vec<Task> = specs.iter().map(|spec| Task::new(spec, 1)).collect();

        let option = TaskOption::new(5, 0).with_executable_file_hash("h");
        let bridge = MemoryBridge::new();
        let in0 = bridge.claim_sender("h-ct-5-ds-0-shard-0").await.unwrap();
        let in1 = bridge.claim_sender("h-ct-5-ds-0-shard-1").await.unwrap();
        let out0 = bridge.claim_receiver("h-ct-5-ds-2-shard-0", 8).await.unwrap();
        let out1 = bridge.claim_receiver("h-ct-5-ds-2-shard-1", 8).await.unwrap();

        let tracker = TaskTracker::new();
        let mut status = ExecutorStatus::new();
        let report = PipelineWirer::new(&option, &bridge, &tracker, 1, &mut status)
            .connect_inputs_and_outputs(&mut tasks)
            .await
            .unwrap();

        assert_eq!(report.internal_forwarders, 2);
        assert_eq!(report.external_adapters, 4);
        let input_names: Vec<&str> = status
            .input_channel_statuses
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(input_names, vec!["h-ct-5-ds-0-shard-0", "h-ct-5-ds-0-shard-1"]);

        for v in [1i64, 2, 3] {
            in0.send(v.to_be_bytes().to_vec()).await.unwrap();
        }
        for v in [10i64, 20, 30] {
            in1.send(v.to_be_bytes().to_vec()).await.unwrap();
        }
        drop((in0, in1));

        for task in tasks {
            tracker.spawn(async move { task.run().await.unwrap() });
        }
        tracker.close();

        assert_eq!(drain(out0).await, vec![1, 2, 3]);
        assert_eq!(drain(out1).await, vec![10, 20, 30]);
        tracker.wait().await;
    }
}
