//! flowrun channel bridge.
//!
//! Resolves named channels to in-process raw channels and adapts them to the
//! typed channels stages read and write:
//!
//! - `bridge` - the [`ChannelBridge`] trait used by the task runner
//! - `memory` - in-process named channels
//! - `agent` / `tcp` - named channels served over TCP
//! - `adapter` - raw ↔ typed background adapters
//! - `codec` - wire encoding of values

pub mod adapter;
pub mod agent;
pub mod bridge;
pub mod codec;
pub mod error;
pub mod frame;
pub mod memory;
pub mod tcp;

pub use adapter::{connect_raw_read_to_typed, connect_typed_write_to_raw};
pub use agent::AgentServer;
pub use bridge::{ChannelBridge, RawReceiver, RawSender};
pub use error::{BridgeError, CodecError};
pub use memory::MemoryBridge;
pub use tcp::TcpBridge;
