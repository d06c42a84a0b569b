//! Transport-abstracted connection, agent, server and module-loop
//! plane for the gate session framework.
//!
//! Built on [`gate_core`]'s wire format (length-prefix framing,
//! envelope pack/unpack, pluggable cipher) this crate adds everything
//! needed to run a real server: a uniform [`Conn`] over TCP, reliable
//! UDP and WebSocket transports, an [`Agent`] that pairs a connection
//! with a [`Processor`], a channel-RPC [`RpcServer`] sink, the
//! [`Gate`] that owns the listeners, and the [`FrameSkeleton`] each
//! application module runs its own logic on top of.

pub mod agent;
pub mod conn;
pub mod error;
pub mod gate;
pub mod processor;
pub mod rpc;
pub mod server;
pub mod skeleton;
pub mod timer;

pub use agent::Agent;
pub use conn::{Conn, ConnHandle, FrameReader};
pub use error::Error;
pub use gate::{Gate, NoReliableListener};
pub use processor::{DynMessage, Processor, UserData};
pub use rpc::{CallInfo, CbJob, RetInfo, RpcArg, RpcArgs, RpcServer};
#[cfg(feature = "websocket")]
pub use server::{WsServer, WsTlsConfig};
pub use server::{ReliableServer, ServerConfig, StreamServer};
pub use skeleton::{FrameSkeleton, Looper, NoopLooper};
pub use timer::{TimerDispatcher, TimerEntry, TimerHandle};
