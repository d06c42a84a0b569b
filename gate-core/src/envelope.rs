//! The processor envelope: `[namelen:u16][name][ciphertext]`.
//!
//! `namelen` and the two-byte field it occupies use the processor's
//! configured byte order; `name` is the registered wire name of the
//! message; everything after it is the encoded body, encrypted with
//! whatever [`crate::Cipher`] the processor was built with.

use crate::cipher::{Cipher, Key};
use crate::config::ByteOrder;
use crate::error::Error;
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// A structured application message with a stable wire name.
///
/// The wire name is the self-describing tag placed in the envelope;
/// it is typically the fully-qualified type name, but any globally
/// unique string the application chooses is valid.
pub trait WireMessage: Sized {
    const NAME: &'static str;

    fn encode(&self) -> Result<Vec<u8>, Error>;
    fn decode(body: &[u8]) -> Result<Self, Error>;
}

/// Packs a wire name and an already-encoded, already-encrypted body
/// into one envelope.
pub fn pack(name: &str, ciphertext: &[u8], order: ByteOrder) -> Result<Vec<u8>, Error> {
    if name.len() > u16::MAX as usize {
        return Err(Error::Encode(format!(
            "message name {name:?} exceeds the 65535 byte envelope limit"
        )));
    }
    let namelen = name.len() as u16;
    let mut out = Vec::with_capacity(2 + name.len() + ciphertext.len());
    let mut len_buf = [0u8; 2];
    match order {
        ByteOrder::BigEndian => BigEndian::write_u16(&mut len_buf, namelen),
        ByteOrder::LittleEndian => LittleEndian::write_u16(&mut len_buf, namelen),
    }
    out.extend_from_slice(&len_buf);
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Splits an envelope into its wire name and encrypted body.
pub fn unpack(data: &[u8], order: ByteOrder) -> Result<(&str, &[u8]), Error> {
    if data.len() < 2 {
        return Err(Error::TooShort);
    }
    let namelen = match order {
        ByteOrder::BigEndian => BigEndian::read_u16(data),
        ByteOrder::LittleEndian => LittleEndian::read_u16(data),
    } as usize;
    if namelen == 0 {
        return Err(Error::NameTooShort);
    }
    if data.len() < 2 + namelen {
        return Err(Error::TooShort);
    }
    let name = std::str::from_utf8(&data[2..2 + namelen])
        .map_err(|e| Error::Decode(format!("message name is not valid utf-8: {e}")))?;
    Ok((name, &data[2 + namelen..]))
}

/// Encodes and encrypts a [`WireMessage`] into a full envelope.
pub fn encode_envelope<M: WireMessage>(
    msg: &M,
    cipher: &dyn Cipher,
    key: &Key,
    order: ByteOrder,
) -> Result<Vec<u8>, Error> {
    let plaintext = msg.encode()?;
    let ciphertext = cipher.encrypt(key, &plaintext);
    pack(M::NAME, &ciphertext, order)
}

/// Decrypts and decodes a full envelope into a [`WireMessage`],
/// checking the envelope's name matches `M::NAME`.
pub fn decode_envelope<M: WireMessage>(
    data: &[u8],
    cipher: &dyn Cipher,
    key: &Key,
    order: ByteOrder,
) -> Result<M, Error> {
    let (name, ciphertext) = unpack(data, order)?;
    if name != M::NAME {
        return Err(Error::UnknownName(name.to_string()));
    }
    let plaintext = cipher.decrypt(key, ciphertext);
    M::decode(&plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::XorCipher;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);

    impl WireMessage for Ping {
        const NAME: &'static str = "pkg.Ping";

        fn encode(&self) -> Result<Vec<u8>, Error> {
            Ok(self.0.to_be_bytes().to_vec())
        }

        fn decode(body: &[u8]) -> Result<Self, Error> {
            let arr: [u8; 4] = body.try_into().map_err(|_| Error::TooShort)?;
            Ok(Ping(u32::from_be_bytes(arr)))
        }
    }

    #[test]
    fn envelope_round_trips() {
        let cipher = XorCipher;
        let key = Key::new(b"k".to_vec());
        let msg = Ping(7);

        let wire = encode_envelope(&msg, &cipher, &key, ByteOrder::BigEndian).unwrap();
        // leading two bytes = name length (8, for "pkg.Ping")
        assert_eq!(&wire[..2], &[0x00, 0x08]);
        assert_eq!(&wire[2..10], b"pkg.Ping");

        let decoded: Ping = decode_envelope(&wire, &cipher, &key, ByteOrder::BigEndian).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unpack_rejects_short_input() {
        assert!(matches!(unpack(&[0x00], ByteOrder::BigEndian), Err(Error::TooShort)));
        assert!(matches!(unpack(&[], ByteOrder::BigEndian), Err(Error::TooShort)));
    }

    #[test]
    fn unpack_rejects_truncated_name() {
        // namelen says 10 bytes of name but only 2 are present.
        let data = [0x00, 0x0a, b'a', b'b'];
        assert!(matches!(unpack(&data, ByteOrder::BigEndian), Err(Error::TooShort)));
    }

    #[test]
    fn unpack_rejects_zero_namelen() {
        let data = [0x00, 0x00];
        assert!(matches!(unpack(&data, ByteOrder::BigEndian), Err(Error::NameTooShort)));
    }

    #[test]
    fn decode_envelope_rejects_name_mismatch() {
        let cipher = XorCipher;
        let key = Key::new(b"k".to_vec());
        let wire = pack("pkg.Other", &[0u8; 4], ByteOrder::BigEndian).unwrap();
        let err = decode_envelope::<Ping>(&wire, &cipher, &key, ByteOrder::BigEndian).unwrap_err();
        assert!(matches!(err, Error::UnknownName(_)));
    }
}
