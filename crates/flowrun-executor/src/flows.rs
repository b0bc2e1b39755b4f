//! Flows the executor binary can run by name.

use std::sync::Arc;

use flowrun_core::{ContextId, Datum, ValueType};

use crate::flow::{FlowContext, TaskSpec};
use crate::stages::RecordStage;

/// Names accepted by [`build_flow`].
pub const FLOW_NAMES: &[&str] = &["uppercase", "passthrough"];

/// Build a built-in flow under the given context id.
pub fn build_flow(name: &str, context_id: ContextId) -> Option<FlowContext> {
    match name {
        "uppercase" => Some(uppercase(context_id)),
        "passthrough" => Some(passthrough(context_id)),
        _ => None,
    }
}

/// Text lines fed from one external input, uppercased, empty lines dropped.
///
/// Reads `{hash}-ct-{id}-input-0-p-0`, writes `{hash}-ct-{id}-ds-2-shard-0`.
fn uppercase(context_id: ContextId) -> FlowContext {
    let mut fc = FlowContext::new(context_id);
    let lines = fc.add_source_dataset(ValueType::Text, 1);
    let upper = fc.add_dataset(ValueType::Text);
    let kept = fc.add_dataset(ValueType::Text);

    fc.add_task(
        TaskSpec::new("read", Arc::new(RecordStage::identity())).with_output(lines.shard(0)),
    );
    fc.add_task(
        TaskSpec::new("uppercase", Arc::new(RecordStage::map(to_uppercase)))
            .with_input(lines.shard(0))
            .with_output(upper.shard(0)),
    );
    fc.add_task(
        TaskSpec::new(
            "drop-empty",
            Arc::new(RecordStage::filter(|d| {
                d.as_text().is_some_and(|s| !s.trim().is_empty())
            })),
        )
        .with_input(upper.shard(0))
        .with_output(kept.shard(0)),
    );
    fc
}

/// Raw bytes relayed unchanged from an upstream shard.
///
/// Reads `{hash}-ct-{id}-ds-0-shard-0`, locally or from `--inputs`, and
/// writes `{hash}-ct-{id}-ds-1-shard-0`.
fn passthrough(context_id: ContextId) -> FlowContext {
    let mut fc = FlowContext::new(context_id);
    let upstream = fc.add_dataset(ValueType::Bytes);
    let out = fc.add_dataset(ValueType::Bytes);
    fc.add_task(
        TaskSpec::new("passthrough", Arc::new(RecordStage::identity()))
            .with_input(upstream.shard(0))
            .with_output(out.shard(0)),
    );
    fc
}

fn to_uppercase(datum: Datum) -> Datum {
    match datum {
        Datum::Text(s) => Datum::Text(s.to_uppercase()),
        other => other,
    }
}
