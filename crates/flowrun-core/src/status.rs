//! Execution status records for a task group run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Throughput record for one bridged channel.
///
/// Written by the adapter that owns the channel, read afterwards for reporting.
#[derive(Debug, Default)]
pub struct ChannelStatus {
    name: String,
    length: AtomicU64,
    started_at: OnceLock<DateTime<Utc>>,
    stopped_at: OnceLock<DateTime<Utc>>,
}

impl ChannelStatus {
    /// Create a new shared status record for the named channel.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            ..Self::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of values moved through the channel so far.
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    /// Record one value moved through the channel.
    pub fn record_value(&self) {
        self.length.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark the channel as started. Only the first call has an effect.
    pub fn mark_started(&self) {
        let _ = self.started_at.set(Utc::now());
    }

    /// Mark the channel as drained. Only the first call has an effect.
    pub fn mark_stopped(&self) {
        let _ = self.stopped_at.set(Utc::now());
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.get().copied()
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at.get().copied()
    }

    /// Returns true once the channel has been fully drained.
    pub fn is_stopped(&self) -> bool {
        self.stopped_at.get().is_some()
    }

    pub fn snapshot(&self) -> ChannelStatusSnapshot {
        ChannelStatusSnapshot {
            name: self.name.clone(),
            length: self.length(),
            started_at: self.started_at(),
            stopped_at: self.stopped_at(),
        }
    }
}

/// Point-in-time copy of a [`ChannelStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStatusSnapshot {
    pub name: String,
    pub length: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Status of one task group execution, owned by the runner.
#[derive(Debug, Default)]
pub struct ExecutorStatus {
    /// One record per bridged input channel, in wiring order.
    pub input_channel_statuses: Vec<Arc<ChannelStatus>>,

    /// Record for the externally exposed output channel.
    pub output_channel_status: Option<Arc<ChannelStatus>>,

    /// When all channels were wired.
    pub ready_time: Option<DateTime<Utc>>,

    /// When the run was accepted.
    pub start_time: Option<DateTime<Utc>>,

    /// When every stage and adapter finished.
    pub stop_time: Option<DateTime<Utc>>,
}

impl ExecutorStatus {
    /// Create an empty status record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.input_channel_statuses.is_empty()
            && self.output_channel_status.is_none()
            && self.ready_time.is_none()
            && self.start_time.is_none()
            && self.stop_time.is_none()
    }

    /// Wall time between start and stop, if the run finished.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some((stop - start).num_milliseconds()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> ExecutorStatusSnapshot {
        ExecutorStatusSnapshot {
            input_channel_statuses: self
                .input_channel_statuses
                .iter()
                .map(|s| s.snapshot())
                .collect(),
            output_channel_status: self.output_channel_status.as_ref().map(|s| s.snapshot()),
            ready_time: self.ready_time,
            start_time: self.start_time,
            stop_time: self.stop_time,
        }
    }
}

/// Serializable copy of an [`ExecutorStatus`] for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStatusSnapshot {
    pub input_channel_statuses: Vec<ChannelStatusSnapshot>,
    pub output_channel_status: Option<ChannelStatusSnapshot>,
    pub ready_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}
