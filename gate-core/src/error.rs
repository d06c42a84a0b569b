use thiserror::Error;

/// Errors surfaced by framing, encoding and decoding.
///
/// A framing or registry error is always fatal to the session that
/// produced it; callers are expected to tear the connection down
/// rather than try to resynchronize the stream.
#[derive(Debug, Error)]
pub enum Error {
    #[error("message too long")]
    TooLong,

    #[error("message too short")]
    TooShort,

    #[error("message name too short")]
    NameTooShort,

    #[error("message name {0:?} not registered")]
    UnknownName(String),

    #[error("message {0} is already registered")]
    DuplicateName(String),

    #[error("raw handler path is not supported")]
    RawHandlerUnsupported,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[cfg(feature = "std")]
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
