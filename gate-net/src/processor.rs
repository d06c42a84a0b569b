//! Name-to-type message registry and dispatch (`protobuf.Processor` in
//! the source, generalized from `proto.Message` reflection to the
//! [`gate_core::WireMessage`] trait).
//!
//! Decoded messages and agent user-data are type-erased as
//! `Arc<dyn Any + Send + Sync>` rather than Go's `interface{}`, so both
//! an inline handler and a router can hold their own cheap clone of
//! the same decoded value when `spec.md`'s "both may be set; both
//! fire" rule applies — Go's garbage collector shares the one
//! `interface{}` value across both call sites for free; Rust needs an
//! explicit shared-ownership type to do the same without decoding
//! twice or requiring `Clone` on every message type.

use crate::error::Error;
use crate::rpc::{RpcArgs, RpcServer};
use gate_core::cipher::{Cipher, Key};
use gate_core::config::ByteOrder;
use gate_core::envelope;
use gate_core::WireMessage;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A decoded message or agent user-data value shared between an inline
/// handler and a router without re-decoding or requiring `Clone`.
pub type DynMessage = Arc<dyn Any + Send + Sync>;
pub type UserData = Arc<dyn Any + Send + Sync>;

type DecodeFn = dyn Fn(&[u8]) -> Result<DynMessage, Error> + Send + Sync;
type InlineHandler = dyn Fn(&DynMessage, Option<&UserData>) + Send + Sync;

struct MsgInfo {
    decode: Box<DecodeFn>,
    handler: Option<Box<InlineHandler>>,
    router: Option<Arc<RpcServer>>,
}

/// The wire name to concrete-type registry plus dispatch, exactly the
/// role `protobuf.Processor` plays in the source: `register` once per
/// type at startup, `route` on every inbound message thereafter.
pub struct Processor {
    cipher: Arc<dyn Cipher>,
    key: Key,
    byte_order: ByteOrder,
    msg_info: HashMap<&'static str, MsgInfo>,
}

impl Processor {
    pub fn new(cipher: Arc<dyn Cipher>, key: Key, byte_order: ByteOrder) -> Self {
        Self {
            cipher,
            key,
            byte_order,
            msg_info: HashMap::new(),
        }
    }

    /// Registers `M` under its wire name. Calling this twice for the
    /// same name is a startup wiring bug and panics, matching the
    /// source's `log.Fatal` on duplicate registration.
    pub fn register<M: WireMessage + Send + Sync + 'static>(&mut self) -> &'static str {
        if self.msg_info.contains_key(M::NAME) {
            panic!("message {} is already registered", M::NAME);
        }
        self.msg_info.insert(
            M::NAME,
            MsgInfo {
                decode: Box::new(|body| {
                    M::decode(body)
                        .map(|msg| Arc::new(msg) as DynMessage)
                        .map_err(Error::from)
                }),
                handler: None,
                router: None,
            },
        );
        M::NAME
    }

    /// Attaches a router: matching messages are pushed onto `rpc` as
    /// `Go(name, [msg, userData])`. Unregistered names are a wiring bug
    /// and panic.
    pub fn set_router<M: WireMessage>(&mut self, rpc: Arc<RpcServer>) {
        self.info_mut::<M>().router = Some(rpc);
    }

    /// Attaches an inline handler, invoked synchronously on whichever
    /// task calls `route`. Unregistered names are a wiring bug and
    /// panic.
    pub fn set_handler<M: WireMessage + Send + Sync + 'static>(
        &mut self,
        handler: impl Fn(&M, Option<&UserData>) + Send + Sync + 'static,
    ) {
        self.info_mut::<M>().handler = Some(Box::new(move |msg, user_data| {
            match msg.downcast_ref::<M>() {
                Some(typed) => handler(typed, user_data),
                None => unreachable!("MsgInfo decode/handler type mismatch for a registered name"),
            }
        }));
    }

    fn info_mut<M: WireMessage>(&mut self) -> &mut MsgInfo {
        self.msg_info
            .get_mut(M::NAME)
            .unwrap_or_else(|| panic!("message {} not registered", M::NAME))
    }

    /// Encodes `msg` into a full envelope ready to hand to
    /// [`crate::conn::Conn::write_msg`]. Unlike `Unmarshal`, this does
    /// not consult the registry — the wire name comes straight from
    /// `M::NAME`, exactly as `protobuf.Marshal` derives it from
    /// `proto.MessageName` without a map lookup.
    pub fn encode<M: WireMessage>(&self, msg: &M) -> Result<Vec<u8>, Error> {
        Ok(envelope::encode_envelope(
            msg,
            self.cipher.as_ref(),
            &self.key,
            self.byte_order,
        )?)
    }

    /// Decrypts and decodes one envelope, then dispatches to whichever
    /// inline handler and/or router are attached to its name. Both
    /// fire if both are set. Any unknown name or decode failure is
    /// returned to the caller (the agent), which treats it as a fatal
    /// session error per `spec.md` §4.4's decode error policy.
    pub fn route(&self, data: &[u8], user_data: Option<UserData>) -> Result<(), Error> {
        let (name, ciphertext) = envelope::unpack(data, self.byte_order)?;
        let (&name, info) = self
            .msg_info
            .get_key_value(name)
            .ok_or_else(|| gate_core::Error::UnknownName(name.to_string()))?;

        let plaintext = self.cipher.decrypt(&self.key, ciphertext);
        let msg = (info.decode)(&plaintext)?;

        if let Some(handler) = &info.handler {
            handler(&msg, user_data.as_ref());
        }
        if let Some(router) = &info.router {
            let mut args: RpcArgs = vec![msg];
            if let Some(user_data) = user_data {
                args.push(user_data);
            }
            router.go(name, args);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_core::cipher::XorCipher;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct Ping(u32);

    impl WireMessage for Ping {
        const NAME: &'static str = "pkg.Ping";

        fn encode(&self) -> Result<Vec<u8>, gate_core::Error> {
            Ok(self.0.to_be_bytes().to_vec())
        }

        fn decode(body: &[u8]) -> Result<Self, gate_core::Error> {
            let arr: [u8; 4] = body.try_into().map_err(|_| gate_core::Error::TooShort)?;
            Ok(Ping(u32::from_be_bytes(arr)))
        }
    }

    fn processor() -> Processor {
        Processor::new(Arc::new(XorCipher), Key::new(b"k".to_vec()), ByteOrder::BigEndian)
    }

    #[test]
    fn route_invokes_inline_handler() {
        let mut p = processor();
        p.register::<Ping>();
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = seen.clone();
        p.set_handler::<Ping>(move |msg, _| seen2.store(msg.0, Ordering::SeqCst));

        let wire = p.encode(&Ping(42)).unwrap();
        p.route(&wire, None).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn route_invokes_router_when_set() {
        let mut p = processor();
        p.register::<Ping>();
        let rpc = RpcServer::new(8);
        p.set_router::<Ping>(rpc.clone());

        let wire = p.encode(&Ping(7)).unwrap();
        p.route(&wire, None).unwrap();

        let ci = rpc.chan_call().await.unwrap();
        assert_eq!(ci.name, "pkg.Ping");
        let msg = ci.args[0].downcast_ref::<Ping>().unwrap();
        assert_eq!(msg.0, 7);
    }

    #[tokio::test]
    async fn both_handler_and_router_fire() {
        let mut p = processor();
        p.register::<Ping>();
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = seen.clone();
        p.set_handler::<Ping>(move |msg, _| seen2.store(msg.0, Ordering::SeqCst));
        let rpc = RpcServer::new(8);
        p.set_router::<Ping>(rpc.clone());

        let wire = p.encode(&Ping(9)).unwrap();
        p.route(&wire, None).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 9);
        assert!(rpc.chan_call().await.is_some());
    }

    #[test]
    fn route_rejects_unknown_name() {
        let p = processor();
        let wire = envelope::pack("pkg.Missing", &[0u8; 4], ByteOrder::BigEndian).unwrap();
        let err = p.route(&wire, None).unwrap_err();
        assert!(matches!(err, Error::Frame(gate_core::Error::UnknownName(_))));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_register_panics() {
        let mut p = processor();
        p.register::<Ping>();
        p.register::<Ping>();
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn set_handler_on_unregistered_name_panics() {
        let mut p = processor();
        p.set_handler::<Ping>(|_, _| {});
    }
}
