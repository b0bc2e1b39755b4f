//! Channel endpoint resolution.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::error::BridgeError;

/// Receiving end of a raw channel of encoded values.
pub type RawReceiver = mpsc::Receiver<Vec<u8>>;

/// Sending end of a raw channel of encoded values.
pub type RawSender = mpsc::Sender<Vec<u8>>;

/// Resolves named channels to local raw channel ends.
///
/// Each call hands out one end of the named channel. Dropping a [`RawSender`]
/// ends the stream for whoever reads the name.
#[async_trait]
pub trait ChannelBridge: Send + Sync {
    /// Read a named channel served at a remote location.
    ///
    /// Background work feeding the returned channel is spawned on `tracker`.
    async fn resolve_remote_read(
        &self,
        name: &str,
        location: &str,
        buffer_size: usize,
        tracker: &TaskTracker,
    ) -> Result<RawReceiver, BridgeError>;

    /// Read a named channel served by this host.
    async fn resolve_local_read(
        &self,
        name: &str,
        buffer_size: usize,
        tracker: &TaskTracker,
    ) -> Result<RawReceiver, BridgeError>;

    /// Write a named channel served by this host.
    ///
    /// Background work needed to flush the channel is spawned on `tracker`.
    async fn resolve_local_write(
        &self,
        name: &str,
        tracker: &TaskTracker,
    ) -> Result<RawSender, BridgeError>;

    /// Read a named channel, remotely when a location is known.
    async fn resolve_read(
        &self,
        name: &str,
        location: Option<&str>,
        buffer_size: usize,
        tracker: &TaskTracker,
    ) -> Result<RawReceiver, BridgeError> {
        match location.filter(|l| !l.is_empty()) {
            Some(location) => {
                self.resolve_remote_read(name, location, buffer_size, tracker)
                    .await
            }
            None => self.resolve_local_read(name, buffer_size, tracker).await,
        }
    }
}
