//! Channel bridge backed by TCP agents.

use async_trait::async_trait;
use flowrun_core::channel_capacity;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::bridge::{ChannelBridge, RawReceiver, RawSender};
use crate::error::BridgeError;
use crate::frame::{framed, next_frame, send_frame, send_request, ChannelRequest, FramedChannel};

/// Resolves channels through the local agent, or a remote agent when a
/// location is given.
#[derive(Debug, Clone)]
pub struct TcpBridge {
    agent_addr: String,
    write_buffer_size: usize,
}

impl TcpBridge {
    /// Create a bridge talking to the agent at `agent_addr`.
    pub fn new(agent_addr: impl Into<String>) -> Self {
        Self {
            agent_addr: agent_addr.into(),
            write_buffer_size: 0,
        }
    }

    /// Builder method to set the buffer of channels returned by local writes.
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn agent_addr(&self) -> &str {
        &self.agent_addr
    }

    async fn open(
        &self,
        location: &str,
        request: &ChannelRequest,
    ) -> Result<FramedChannel<TcpStream>, BridgeError> {
        let stream =
            TcpStream::connect(location)
                .await
                .map_err(|source| BridgeError::Resolve {
                    name: request.name.clone(),
                    location: location.to_string(),
                    source,
                })?;
        let mut frames = framed(stream);
        send_request(&mut frames, request).await?;
        debug!(channel = %request.name, location = %location, kind = ?request.kind, "Opened channel");
        Ok(frames)
    }
}

#[async_trait]
impl ChannelBridge for TcpBridge {
    async fn resolve_remote_read(
        &self,
        name: &str,
        location: &str,
        buffer_size: usize,
        tracker: &TaskTracker,
    ) -> Result<RawReceiver, BridgeError> {
        let frames = self
            .open(location, &ChannelRequest::read(name, buffer_size))
            .await?;
        let (tx, rx) = mpsc::channel(channel_capacity(buffer_size));
        let name = name.to_string();
        tracker.spawn(async move {
            if let Err(e) = pump_socket_to_channel(frames, tx).await {
                warn!(channel = %name, error = %e, "Channel read failed");
            }
        });
        Ok(rx)
    }

    async fn resolve_local_read(
        &self,
        name: &str,
        buffer_size: usize,
        tracker: &TaskTracker,
    ) -> Result<RawReceiver, BridgeError> {
        self.resolve_remote_read(name, &self.agent_addr, buffer_size, tracker)
            .await
    }

    async fn resolve_local_write(
        &self,
        name: &str,
        tracker: &TaskTracker,
    ) -> Result<RawSender, BridgeError> {
        let frames = self
            .open(&self.agent_addr, &ChannelRequest::write(name))
            .await?;
        let (tx, rx) = mpsc::channel(channel_capacity(self.write_buffer_size));
        let name = name.to_string();
        tracker.spawn(async move {
            if let Err(e) = pump_channel_to_socket(rx, frames).await {
                warn!(channel = %name, error = %e, "Channel write failed");
            }
        });
        Ok(tx)
    }
}

/// Relay frames into `tx` until EOF or until its reader is gone.
///
/// Dropping `frames` on return closes the socket.
async fn pump_socket_to_channel(
    mut frames: FramedChannel<TcpStream>,
    tx: mpsc::Sender<Vec<u8>>,
) -> Result<(), BridgeError> {
    loop {
        let frame = tokio::select! {
            frame = next_frame(&mut frames) => frame?,
            _ = tx.closed() => {
                debug!("Reader went away, closing socket");
                break;
            }
        };
        let Some(frame) = frame else {
            break;
        };
        if tx.send(frame).await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn pump_channel_to_socket(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut frames: FramedChannel<TcpStream>,
) -> Result<(), BridgeError> {
    while let Some(value) = rx.recv().await {
        send_frame(&mut frames, value).await?;
    }
    SinkExt::<bytes::Bytes>::close(&mut frames).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::agent::AgentServer;
    use crate::frame::next_request;
    use crate::memory::MemoryBridge;
    use tokio::net::TcpListener;

    async fn start_agent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(AgentServer::new(MemoryBridge::new()).serve(listener));
        addr
    }

    #[tokio::test]
    async fn test_write_then_read_through_agent() {
        let addr = start_agent().await;
        let bridge = TcpBridge::new(addr.clone());
        let tracker = TaskTracker::new();

        let tx = bridge.resolve_local_write("job-out", &tracker).await.unwrap();
        for i in 0..3u8 {
            tx.send(vec![i]).await.unwrap();
        }
        drop(tx);
        tracker.close();
        tracker.wait().await;

        let mut rx = bridge
            .resolve_remote_read("job-out", &addr, 4, &tracker)
            .await
            .unwrap();
        let mut received = Vec::new();
        while let Some(value) = rx.recv().await {
            received.push(value);
        }
        assert_eq!(received, vec![vec![0], vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_unreachable_agent_fails_to_resolve() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let bridge = TcpBridge::new(addr);
        let result = bridge
            .resolve_local_read("missing", 1, &TaskTracker::new())
            .await;
        assert!(matches!(result, Err(BridgeError::Resolve { .. })));
    }

    #[tokio::test]
    async fn test_read_pump_stops_when_reader_leaves() {
        // The remote sends one value and then waits for the client to hang up.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let remote = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut frames = framed(stream);
            next_request(&mut frames).await.unwrap();
            send_frame(&mut frames, vec![7]).await.unwrap();
            next_frame(&mut frames).await
        });

        let bridge = TcpBridge::new("127.0.0.1:1");
        let tracker = TaskTracker::new();
        let mut rx = bridge
            .resolve_remote_read("upstream", &addr, 1, &tracker)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(vec![7]));
        drop(rx);

        tracker.close();
        tokio::time::timeout(Duration::from_secs(5), tracker.wait())
            .await
            .expect("read pump outlived its reader");
        assert_eq!(remote.await.unwrap().unwrap(), None);
    }
}
