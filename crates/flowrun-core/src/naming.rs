//! Channel endpoint names shared by cooperating processes.
//!
//! These formats must match byte for byte across every worker of a job.

use crate::{ContextId, DatasetId};

/// Name of one shard of a dataset.
pub fn shard_name(context_id: ContextId, dataset_id: DatasetId, shard_index: u32) -> String {
    format!("ct-{}-ds-{}-shard-{}", context_id, dataset_id, shard_index)
}

/// Channel name for an inter-stage or boundary shard: `{hash}-{shardName}`.
pub fn shard_channel_name(executable_file_hash: &str, shard_name: &str) -> String {
    format!("{}-{}", executable_file_hash, shard_name)
}

/// Channel name for an external input feeding a source dataset.
pub fn external_input_channel_name(
    executable_file_hash: &str,
    context_id: ContextId,
    dataset_id: DatasetId,
    input_index: usize,
) -> String {
    format!(
        "{}-ct-{}-input-{}-p-{}",
        executable_file_hash, context_id, dataset_id, input_index
    )
}
