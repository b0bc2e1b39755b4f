//! Length-prefixed framing for the agent protocol.
//!
//! A connection starts with one header frame holding a JSON [`ChannelRequest`],
//! followed by data frames. Each frame is a big-endian `u32` length and the
//! payload. A clean EOF between frames ends the stream.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::BridgeError;

/// Largest payload accepted in a single frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A connection speaking the agent protocol.
pub type FramedChannel<T> = Framed<T, LengthDelimitedCodec>;

/// Direction of a channel request, from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// The client reads values from the named channel.
    Read,
    /// The client writes values into the named channel.
    Write,
}

/// Header frame opening a channel connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    pub kind: RequestKind,
    pub name: String,
    #[serde(default)]
    pub buffer_size: usize,
}

impl ChannelRequest {
    pub fn read(name: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            kind: RequestKind::Read,
            name: name.into(),
            buffer_size,
        }
    }

    pub fn write(name: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Write,
            name: name.into(),
            buffer_size: 0,
        }
    }
}

/// The frame codec: `u32` big-endian length, payloads up to [`MAX_FRAME_LEN`].
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Wrap a byte stream in the agent framing.
pub fn framed<T>(io: T) -> FramedChannel<T>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, frame_codec())
}

/// Write one data frame.
pub async fn send_frame<T>(frames: &mut FramedChannel<T>, payload: Vec<u8>) -> Result<(), BridgeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    frames.send(Bytes::from(payload)).await?;
    Ok(())
}

/// Read one data frame, or `None` on a clean end of stream.
pub async fn next_frame<T>(frames: &mut FramedChannel<T>) -> Result<Option<Vec<u8>>, BridgeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match frames.next().await {
        Some(frame) => Ok(Some(frame?.to_vec())),
        None => Ok(None),
    }
}

/// Write the header frame for a request.
pub async fn send_request<T>(
    frames: &mut FramedChannel<T>,
    request: &ChannelRequest,
) -> Result<(), BridgeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    send_frame(frames, serde_json::to_vec(request)?).await
}

/// Read the header frame of a connection.
pub async fn next_request<T>(frames: &mut FramedChannel<T>) -> Result<ChannelRequest, BridgeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let header = next_frame(frames)
        .await?
        .ok_or_else(|| BridgeError::Protocol("connection closed before request header".into()))?;
    Ok(serde_json::from_slice(&header)?)
}
