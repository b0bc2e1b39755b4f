//! In-process registry of named raw channels.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flowrun_core::channel_capacity;
use tokio::sync::{mpsc, Mutex};
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::bridge::{ChannelBridge, RawReceiver, RawSender};
use crate::error::BridgeError;

/// Default capacity for channels created by the writing side.
pub const DEFAULT_CAPACITY: usize = 64;

/// Both ends of a named channel; `None` once an end has been handed out.
struct NamedChannel {
    sender: Option<RawSender>,
    receiver: Option<RawReceiver>,
}

impl NamedChannel {
    fn open(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            sender: Some(tx),
            receiver: Some(rx),
        }
    }
}

/// Named channels living inside one process.
///
/// Whichever side asks first creates the channel; each end is handed out once.
/// A name is forgotten once both ends are out, so a later run can reuse it.
/// Clones share the same registry.
#[derive(Clone)]
pub struct MemoryBridge {
    channels: Arc<Mutex<HashMap<String, NamedChannel>>>,
    default_capacity: usize,
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBridge {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty registry whose writer-created channels use `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            default_capacity: channel_capacity(capacity),
        }
    }

    /// Claim the sending end of a named channel.
    pub async fn claim_sender(&self, name: &str) -> Result<RawSender, BridgeError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .entry(name.to_string())
            .or_insert_with(|| NamedChannel::open(self.default_capacity));
        let sender = channel.sender.take().ok_or_else(|| BridgeError::AlreadyClaimed {
            name: name.to_string(),
            end: "sending",
        })?;
        if channel.receiver.is_none() {
            channels.remove(name);
        }
        debug!(channel = %name, "Claimed sending end");
        Ok(sender)
    }

    /// Claim the receiving end of a named channel.
    pub async fn claim_receiver(
        &self,
        name: &str,
        buffer_size: usize,
    ) -> Result<RawReceiver, BridgeError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .entry(name.to_string())
            .or_insert_with(|| NamedChannel::open(channel_capacity(buffer_size)));
        let receiver = channel.receiver.take().ok_or_else(|| BridgeError::AlreadyClaimed {
            name: name.to_string(),
            end: "receiving",
        })?;
        if channel.sender.is_none() {
            channels.remove(name);
        }
        debug!(channel = %name, "Claimed receiving end");
        Ok(receiver)
    }

    /// Names of channels with an end not yet claimed.
    pub async fn channel_names(&self) -> Vec<String> {
        let channels = self.channels.lock().await;
        let mut names: Vec<String> = channels.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ChannelBridge for MemoryBridge {
    async fn resolve_remote_read(
        &self,
        name: &str,
        location: &str,
        buffer_size: usize,
        _tracker: &TaskTracker,
    ) -> Result<RawReceiver, BridgeError> {
        // Every location is this process.
        debug!(channel = %name, location = %location, "Resolving remote read in-process");
        self.claim_receiver(name, buffer_size).await
    }

    async fn resolve_local_read(
        &self,
        name: &str,
        buffer_size: usize,
        _tracker: &TaskTracker,
    ) -> Result<RawReceiver, BridgeError> {
        self.claim_receiver(name, buffer_size).await
    }

    async fn resolve_local_write(
        &self,
        name: &str,
        _tracker: &TaskTracker,
    ) -> Result<RawSender, BridgeError> {
        self.claim_sender(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_first_then_writer() {
        let bridge = MemoryBridge::new();
        let tracker = TaskTracker::new();
        let mut rx = bridge.resolve_local_read("c", 4, &tracker).await.unwrap();
        let tx = bridge.resolve_local_write("c", &tracker).await.unwrap();

        tx.send(b"one".to_vec()).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some(b"one".to_vec()));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_each_end_claimed_once() {
        let bridge = MemoryBridge::new();
        let _tx = bridge.claim_sender("c").await.unwrap();
        assert!(matches!(
            bridge.claim_sender("c").await,
            Err(BridgeError::AlreadyClaimed { end: "sending", .. })
        ));

        let _rx = bridge.claim_receiver("d", 1).await.unwrap();
        assert!(matches!(
            bridge.claim_receiver("d", 1).await,
            Err(BridgeError::AlreadyClaimed { end: "receiving", .. })
        ));
    }

    #[tokio::test]
    async fn test_name_reusable_once_both_ends_claimed() {
        let bridge = MemoryBridge::new();
        let first_tx = bridge.claim_sender("c").await.unwrap();
        let mut first_rx = bridge.claim_receiver("c", 1).await.unwrap();
        assert!(bridge.channel_names().await.is_empty());

        // A second pair gets a fresh channel.
        let second_tx = bridge.claim_sender("c").await.unwrap();
        let mut second_rx = bridge.claim_receiver("c", 1).await.unwrap();
        first_tx.send(vec![1]).await.unwrap();
        second_tx.send(vec![2]).await.unwrap();
        drop((first_tx, second_tx));

        assert_eq!(first_rx.recv().await, Some(vec![1]));
        assert_eq!(first_rx.recv().await, None);
        assert_eq!(second_rx.recv().await, Some(vec![2]));
        assert_eq!(second_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_resolve_read_without_location_is_local() {
        let bridge = MemoryBridge::new();
        let tx = bridge.claim_sender("c").await.unwrap();
        assert_eq!(bridge.channel_names().await, vec!["c".to_string()]);
        let mut rx = bridge
            .resolve_read("c", Some(""), 1, &TaskTracker::new())
            .await
            .unwrap();
        tx.send(vec![1]).await.unwrap();
        assert_eq!(rx.recv().await, Some(vec![1]));
    }
}
