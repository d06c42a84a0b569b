//! A high-level client session, the dialing counterpart to the
//! server's agent: owns a [`StreamConn`] and a background read loop
//! that decodes each envelope's wire name and dispatches to whatever
//! callback the caller registered for it, the same
//! "app pushes, one task drains" split the server side uses for
//! writes — here applied to reads instead, since a client has exactly
//! one peer and no registry to route through.

use anyhow::{anyhow, Result};
use gate_core::cipher::{Cipher, Key};
use gate_core::config::{ByteOrder, LenPrefixConfig};
use gate_core::envelope;
use gate_core::framer::LenPrefixFramer;
use gate_net::conn::{new_stream_conn, StreamConn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

type MsgCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;

struct Router {
    handlers: HashMap<String, MsgCallback>,
    default_handler: Option<MsgCallback>,
}

/// A dialed gate session.
///
/// Cloning shares the same connection and handler table — every clone
/// writes to the same outbound queue and sees the same incoming
/// dispatch.
#[derive(Clone)]
pub struct GateClient {
    conn: Arc<StreamConn>,
    router: Arc<Mutex<Router>>,
    cipher: Arc<dyn Cipher>,
    key: Key,
    byte_order: ByteOrder,
}

impl GateClient {
    /// Dials `addr` and starts the background read loop. `cipher`/`key`
    /// must match whatever the server's processor was built with.
    pub async fn connect(
        addr: &str,
        frame_config: LenPrefixConfig,
        pending_write_num: usize,
        cipher: Arc<dyn Cipher>,
        key: Key,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let framer = LenPrefixFramer::new(frame_config);
        let conn = new_stream_conn(stream, framer, pending_write_num)
            .map_err(|err| anyhow!(err.to_string()))?;
        let conn = Arc::new(conn);

        let router = Arc::new(Mutex::new(Router {
            handlers: HashMap::new(),
            default_handler: None,
        }));

        let client = Self {
            conn: conn.clone(),
            router: router.clone(),
            cipher: cipher.clone(),
            key: key.clone(),
            byte_order: frame_config.byte_order,
        };

        tokio::spawn(Self::reader_loop(
            conn,
            router,
            cipher,
            key,
            frame_config.byte_order,
        ));

        Ok(client)
    }

    async fn reader_loop(
        conn: Arc<StreamConn>,
        router: Arc<Mutex<Router>>,
        cipher: Arc<dyn Cipher>,
        key: Key,
        byte_order: ByteOrder,
    ) {
        loop {
            let data = match conn.read_msg().await {
                Ok(data) => data,
                Err(err) => {
                    tracing::debug!(error = %err, "gate client: read failed, closing");
                    break;
                }
            };
            let (name, ciphertext) = match envelope::unpack(&data, byte_order) {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::debug!(error = %err, "gate client: malformed envelope, closing");
                    break;
                }
            };
            let plaintext = cipher.decrypt(&key, ciphertext);

            let router = router.lock().await;
            if let Some(handler) = router.handlers.get(name) {
                handler(plaintext);
            } else if let Some(default) = &router.default_handler {
                default(plaintext);
            }
        }
        conn.close();
    }

    /// Registers the callback invoked for every message decoded under
    /// `name`. Replaces any handler previously registered for it.
    pub async fn on(&self, name: impl Into<String>, callback: impl Fn(Vec<u8>) + Send + Sync + 'static) {
        self.router.lock().await.handlers.insert(name.into(), Box::new(callback));
    }

    /// Registers the callback invoked for any message with no
    /// name-specific handler.
    pub async fn on_any(&self, callback: impl Fn(Vec<u8>) + Send + Sync + 'static) {
        self.router.lock().await.default_handler = Some(Box::new(callback));
    }

    /// Encrypts and enqueues `plaintext` under `name`. Never blocks —
    /// a full outbound queue destroys the connection, same as the
    /// server side.
    pub fn send(&self, name: &str, plaintext: &[u8]) -> Result<()> {
        let ciphertext = self.cipher.encrypt(&self.key, plaintext);
        let wire = envelope::pack(name, &ciphertext, self.byte_order)?;
        self.conn
            .write_msg(&[&wire])
            .map_err(|err| anyhow!(err.to_string()))
    }

    pub fn close(&self) {
        self.conn.close();
    }
}
