//! Scenario 4: a connection cap rejects the `(K+1)`-th client
//! immediately while the first `K` stay connected.

use gate_core::cipher::{Key, XorCipher};
use gate_core::config::{ByteOrder, LenPrefixConfig};
use gate_net::conn::StreamConn;
use gate_net::{Agent, Processor, ServerConfig, StreamServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

fn processor() -> Arc<Processor> {
    Arc::new(Processor::new(
        Arc::new(XorCipher),
        Key::new(b"cap-test-key".to_vec()),
        ByteOrder::BigEndian,
    ))
}

#[tokio::test]
async fn connection_cap_rejects_the_kplus1th_client() {
    let processor = processor();
    let config = ServerConfig::new(2, 8);
    let server = StreamServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        config,
        LenPrefixConfig::default(),
        move |conn: StreamConn| Agent::new(conn, processor.clone(), None),
    )
    .await
    .unwrap();
    let addr = server.local_addr();

    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut third = TcpStream::connect(addr).await.unwrap();

    // The third connection is over the cap: the server destroys it
    // right after accept, so the client observes EOF almost
    // immediately.
    let mut buf = [0u8; 8];
    let read = tokio::time::timeout(Duration::from_secs(2), third.read(&mut buf))
        .await
        .expect("third connection should be closed promptly")
        .unwrap();
    assert_eq!(read, 0, "third connection should see EOF, not data");

    // The first two stay open: a short read attempt just times out.
    let still_open = tokio::time::timeout(Duration::from_millis(200), first.read(&mut buf)).await;
    assert!(still_open.is_err(), "first connection should still be open");
    let still_open = tokio::time::timeout(Duration::from_millis(200), second.read(&mut buf)).await;
    assert!(still_open.is_err(), "second connection should still be open");

    server.close().await;
}
