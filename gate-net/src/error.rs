use thiserror::Error;

/// Errors surfaced by the connection, server, agent, processor and
/// skeleton layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("conn closed")]
    Closed,

    #[error(transparent)]
    Frame(#[from] gate_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("too many connections")]
    TooManyConnections,

    #[error("NewAgent must not be nil")]
    MissingAgentFactory,

    #[error("bind error: {0}")]
    Bind(std::io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("tls config error: {0}")]
    Tls(String),

    #[error("rpc sink closed")]
    RpcClosed,
}
