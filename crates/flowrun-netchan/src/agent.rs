//! TCP agent serving named channels to local and remote workers.

use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::frame::{framed, next_frame, next_request, send_frame, RequestKind};
use crate::memory::MemoryBridge;

/// Serves the channels of a [`MemoryBridge`] over TCP.
///
/// A `write` connection pushes frames into the named channel until EOF; a
/// `read` connection receives every frame of the named channel, then EOF.
#[derive(Clone, Default)]
pub struct AgentServer {
    channels: MemoryBridge,
}

impl AgentServer {
    /// Create an agent over the given channel registry.
    pub fn new(channels: MemoryBridge) -> Self {
        Self { channels }
    }

    /// The registry this agent serves.
    pub fn channels(&self) -> &MemoryBridge {
        &self.channels
    }

    /// Accept connections forever.
    pub async fn serve(self, listener: TcpListener) -> Result<(), BridgeError> {
        info!(addr = ?listener.local_addr().ok(), "Channel agent listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            let channels = self.channels.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(channels, stream).await {
                    warn!(peer = %peer, error = %e, "Channel connection failed");
                }
            });
        }
    }
}

async fn handle_connection(channels: MemoryBridge, stream: TcpStream) -> Result<(), BridgeError> {
    let mut frames = framed(stream);
    let request = next_request(&mut frames).await?;
    debug!(channel = %request.name, kind = ?request.kind, "Channel request");

    match request.kind {
        RequestKind::Write => {
            let tx = channels.claim_sender(&request.name).await?;
            let mut count = 0u64;
            while let Some(frame) = next_frame(&mut frames).await? {
                if tx.send(frame).await.is_err() {
                    warn!(channel = %request.name, "Reader went away, dropping writer");
                    break;
                }
                count += 1;
            }
            debug!(channel = %request.name, count, "Writer finished");
        }
        RequestKind::Read => {
            let mut rx = channels
                .claim_receiver(&request.name, request.buffer_size)
                .await?;
            let mut count = 0u64;
            while let Some(value) = rx.recv().await {
                send_frame(&mut frames, value).await?;
                count += 1;
            }
            // Flushes, then shuts down the write half.
            SinkExt::<bytes::Bytes>::close(&mut frames).await?;
            debug!(channel = %request.name, count, "Reader finished");
        }
    }
    Ok(())
}
