//! # gate-core
//!
//! Wire-format primitives for the gate session framework: the
//! length-prefixed message framer, the name-prefixed processor
//! envelope, and the pluggable body cipher.
//!
//! This crate stays free of any particular transport or runtime; it
//! only knows how to turn a byte stream into framed messages and
//! framed messages into typed application structs.

pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;

#[cfg(feature = "std")]
pub mod framer;

pub use cipher::{Cipher, Key, XorCipher};
pub use config::{ByteOrder, LenPrefixConfig, LenWidth};
pub use envelope::WireMessage;
pub use error::Error;

#[cfg(feature = "std")]
pub use framer::LenPrefixFramer;
