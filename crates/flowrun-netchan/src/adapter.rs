//! Background adapters between raw and typed channels.
//!
//! Each adapter owns the sending side of its destination channel and drops it
//! when its source is exhausted, which is how end of stream propagates.

use std::sync::Arc;

use flowrun_core::{ChannelStatus, Datum, ValueType};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::bridge::{RawReceiver, RawSender};
use crate::codec;

/// Decode raw values into `typed` until `raw` is exhausted.
///
/// The decode loop runs on `tracker`. A value that fails to decode ends the
/// stream.
pub fn connect_raw_read_to_typed(
    name: &str,
    mut raw: RawReceiver,
    typed: mpsc::Sender<Datum>,
    value_type: ValueType,
    tracker: &TaskTracker,
) -> Arc<ChannelStatus> {
    let status = ChannelStatus::new(name);
    let adapter_status = status.clone();
    let name = name.to_string();

    tracker.spawn(async move {
        adapter_status.mark_started();
        while let Some(bytes) = raw.recv().await {
            let datum = match codec::decode(value_type, &bytes) {
                Ok(datum) => datum,
                Err(e) => {
                    error!(channel = %name, value_type = %value_type, error = %e, "Failed to decode value");
                    break;
                }
            };
            if typed.send(datum).await.is_err() {
                warn!(channel = %name, "Typed receiver dropped, stopping decode");
                break;
            }
            adapter_status.record_value();
        }
        adapter_status.mark_stopped();
        debug!(channel = %name, count = adapter_status.length(), "Input channel drained");
    });

    status
}

/// Encode typed values into `raw` until `typed` is exhausted.
///
/// A value that is not of `value_type` ends the stream.
pub fn connect_typed_write_to_raw(
    name: &str,
    mut typed: mpsc::Receiver<Datum>,
    raw: RawSender,
    value_type: ValueType,
    tracker: &TaskTracker,
) -> Arc<ChannelStatus> {
    let status = ChannelStatus::new(name);
    let adapter_status = status.clone();
    let name = name.to_string();

    tracker.spawn(async move {
        adapter_status.mark_started();
        while let Some(datum) = typed.recv().await {
            let bytes = match codec::encode_as(value_type, &datum) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(channel = %name, value_type = %value_type, error = %e, "Failed to encode value");
                    break;
                }
            };
            if raw.send(bytes).await.is_err() {
                warn!(channel = %name, "Raw receiver dropped, stopping encode");
                break;
            }
            adapter_status.record_value();
        }
        adapter_status.mark_stopped();
        debug!(channel = %name, count = adapter_status.length(), "Output channel drained");
    });

    status
}
