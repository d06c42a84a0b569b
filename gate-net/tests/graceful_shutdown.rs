//! Scenario 6: graceful shutdown of many quiescent connections.
//!
//! Fifty clients connect and then do nothing. Closing the server must
//! still return within a bounded time, and every one of the fifty
//! agents must have run its `CloseAgent` report before that happens —
//! a read task blocked on a peer that never sends or closes anything
//! is exactly the case `destroy()`'s raw-socket shutdown exists for.

use gate_core::cipher::{Key, XorCipher};
use gate_core::config::{ByteOrder, LenPrefixConfig};
use gate_net::conn::StreamConn;
use gate_net::{Agent, Processor, RpcServer, ServerConfig, StreamServer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

const CLIENT_COUNT: usize = 50;

fn processor() -> Arc<Processor> {
    Arc::new(Processor::new(
        Arc::new(XorCipher),
        Key::new(b"shutdown-test-key".to_vec()),
        ByteOrder::BigEndian,
    ))
}

#[tokio::test]
async fn graceful_shutdown_drains_fifty_quiescent_agents() {
    let processor = processor();
    let rpc = RpcServer::new(CLIENT_COUNT + 8);
    let closed = Arc::new(AtomicUsize::new(0));

    let counted = closed.clone();
    rpc.register("CloseAgent", move |_args| {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    // A dedicated task pumps the rpc queue, standing in for the
    // frame skeleton a real module would run this server under.
    let pump_rpc = rpc.clone();
    let pump = tokio::spawn(async move {
        while let Some(ci) = pump_rpc.chan_call().await {
            pump_rpc.exec(ci);
        }
    });

    let config = ServerConfig::new(CLIENT_COUNT, 8);
    let server = StreamServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        config,
        LenPrefixConfig::default(),
        move |conn: StreamConn| Agent::new(conn, processor.clone(), Some(rpc.clone())),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let mut clients = Vec::with_capacity(CLIENT_COUNT);
    for _ in 0..CLIENT_COUNT {
        clients.push(TcpStream::connect(addr).await.unwrap());
    }

    // Give the accept loop a moment to finish spawning every agent —
    // a client's `connect` can complete before the server's own
    // `accept` call does.
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(2), server.close())
        .await
        .expect("server.close() should return within the bound");

    assert_eq!(
        closed.load(Ordering::SeqCst),
        CLIENT_COUNT,
        "every quiescent agent should have reported CloseAgent before close() returns"
    );

    drop(clients);
    pump.abort();
}
