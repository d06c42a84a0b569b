//! A minimal gate that echoes every message it receives back to the
//! sender, over both the stream and websocket transports at once.
//!
//! Demonstrates the intended wiring: one `Processor` shared by every
//! transport, one `RpcServer` the processor routes decoded messages
//! onto, and one `FrameSkeleton` draining that server on its own task
//! so message handling never runs on an accept loop or a connection's
//! read task.

use anyhow::Result;
use gate_core::cipher::{Key, XorCipher};
use gate_core::config::{ByteOrder, LenPrefixConfig};
use gate_core::WireMessage;
use gate_net::conn::{StreamConn, StreamReader, WsConn, WsReader};
use gate_net::{Agent, FrameSkeleton, Gate, NoopLooper, Processor, RpcServer, ServerConfig, TimerDispatcher};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::ReadHalf;
use tokio::net::TcpStream;

struct EchoMsg(Vec<u8>);

impl WireMessage for EchoMsg {
    const NAME: &'static str = "echo.Echo";

    fn encode(&self) -> Result<Vec<u8>, gate_core::Error> {
        Ok(self.0.clone())
    }

    fn decode(body: &[u8]) -> Result<Self, gate_core::Error> {
        Ok(EchoMsg(body.to_vec()))
    }
}

/// Writes `msg` back to whichever transport `user_data` came from.
/// A multi-transport gate's handlers can't assume a concrete `Agent<R>`
/// type, so this tries each transport the gate actually serves in
/// turn.
fn echo_back(user_data: &gate_net::UserData, msg: &EchoMsg) {
    if let Some(agent) = Agent::<StreamReader<ReadHalf<TcpStream>>>::downcast(user_data) {
        agent.write_msg(msg);
        return;
    }
    if let Some(agent) = Agent::<WsReader>::downcast(user_data) {
        agent.write_msg(msg);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cipher = Arc::new(XorCipher);
    let key = Key::new(b"echo-gate-demo-key".to_vec());
    let frame_config = LenPrefixConfig::default();

    let server = RpcServer::new(256);
    server.register("echo.Echo", |args| {
        let msg = args[0].downcast_ref::<EchoMsg>().expect("echo.Echo arg 0 is EchoMsg");
        let user_data = args[1].clone();
        echo_back(&user_data, msg);
    });
    server.register("NewAgent", |args| {
        let user_data = &args[0];
        let addr = Agent::<StreamReader<ReadHalf<TcpStream>>>::downcast(user_data)
            .and_then(|a| a.remote_addr())
            .or_else(|| Agent::<WsReader>::downcast(user_data).and_then(|a| a.remote_addr()));
        tracing::info!(?addr, "agent connected");
    });
    server.register("CloseAgent", |_args| {
        tracing::info!("agent disconnected");
    });

    let mut processor = Processor::new(cipher, key, ByteOrder::BigEndian);
    processor.register::<EchoMsg>();
    processor.set_router::<EchoMsg>(server.clone());
    let processor = Arc::new(processor);

    let skeleton = FrameSkeleton::new(
        server.clone(),
        RpcServer::new(8),
        RpcServer::new(8),
        RpcServer::new(8),
        TimerDispatcher::new(8),
        NoopLooper,
    );
    let (skeleton_close_tx, skeleton_close_rx) = tokio::sync::oneshot::channel();
    let skeleton_task = tokio::spawn(skeleton.run(skeleton_close_rx));

    let stream_processor = processor.clone();
    let stream_server = server.clone();
    let new_stream_agent = move |conn: StreamConn| {
        let agent = Agent::new(conn, stream_processor.clone(), Some(stream_server.clone()));
        stream_server.go("NewAgent", vec![agent.as_user_data()]);
        agent
    };

    let ws_processor = processor.clone();
    let ws_server = server.clone();
    let new_ws_agent = move |conn: WsConn| {
        let agent = Agent::new(conn, ws_processor.clone(), Some(ws_server.clone()));
        ws_server.go("NewAgent", vec![agent.as_user_data()]);
        agent
    };

    let gate = Gate::<gate_net::NoReliableListener> {
        stream_addr: Some("127.0.0.1:7000".parse::<SocketAddr>()?),
        stream_framer: frame_config,
        new_stream_agent: Some(Arc::new(new_stream_agent)),
        ws_addr: Some("127.0.0.1:7001".parse::<SocketAddr>()?),
        ws_framer: frame_config,
        new_ws_agent: Some(Arc::new(new_ws_agent)),
        ws_http_timeout: Some(std::time::Duration::from_secs(10)),
        ws_tls: None,
        reliable_listener: None,
        reliable_framer: frame_config,
        new_reliable_agent: None,
        server_config: ServerConfig::default(),
    };

    tracing::info!("echo-gate listening: tcp 127.0.0.1:7000, ws 127.0.0.1:7001");

    let (gate_close_tx, gate_close_rx) = tokio::sync::oneshot::channel();
    let gate_task = tokio::spawn(gate.run(gate_close_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = gate_close_tx.send(());
    let _ = skeleton_close_tx.send(());

    gate_task.await??;
    skeleton_task.await?;
    Ok(())
}
