use serde::{Deserialize, Serialize};

/// Width, in bytes, of a length-prefixed framer's length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LenWidth {
    One,
    Two,
    Four,
}

impl LenWidth {
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            LenWidth::One => 1,
            LenWidth::Two => 2,
            LenWidth::Four => 4,
        }
    }

    /// The largest length value representable in this width.
    #[inline]
    pub fn max_representable(self) -> u64 {
        match self {
            LenWidth::One => u8::MAX as u64,
            LenWidth::Two => u16::MAX as u64,
            LenWidth::Four => u32::MAX as u64,
        }
    }
}

/// Byte order used for the length prefix (and the envelope's name
/// length field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Configuration for a [`crate::framer::LenPrefixFramer`].
///
/// `min_len`/`max_len` bound the body length (in bytes) that a single
/// successful read or write may carry; `max_len` is additionally
/// clamped to what `len_width` can represent on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LenPrefixConfig {
    pub len_width: LenWidth,
    pub min_len: u32,
    pub max_len: u32,
    pub byte_order: ByteOrder,
}

impl LenPrefixConfig {
    pub fn new(len_width: LenWidth, min_len: u32, max_len: u32, byte_order: ByteOrder) -> Self {
        let cap = len_width.max_representable();
        let max_len = (max_len as u64).min(cap) as u32;
        Self {
            len_width,
            min_len,
            max_len,
            byte_order,
        }
    }
}

impl Default for LenPrefixConfig {
    fn default() -> Self {
        // A generous but bounded default: 2-byte length, up to 64 KiB bodies.
        Self::new(LenWidth::Two, 1, 65_535, ByteOrder::BigEndian)
    }
}
