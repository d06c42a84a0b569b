//! Pluggable body cipher for the processor envelope.
//!
//! The original implementation this crate is descended from hard-coded
//! a single XXTEA key compiled into the binary — obfuscation, not a
//! security boundary. This module keeps the "encrypted body, plaintext
//! name prefix" envelope shape but makes the cipher and its key an
//! explicit, constructor-supplied value instead of a constant.

/// A symmetric key for a [`Cipher`].
#[derive(Clone)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Symmetric cipher applied to a processor envelope's body.
///
/// Implementations are not expected to authenticate the ciphertext;
/// the envelope's length framing already bounds the message, and a
/// corrupted body is caught at decode time by the application message
/// type, not by the cipher.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, key: &Key, plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, key: &Key, ciphertext: &[u8]) -> Vec<u8>;
}

/// Stream-cipher style XOR over a repeating key.
///
/// This is the default, dependency-free `Cipher` implementation.
/// It is symmetric (`decrypt` is the same operation as `encrypt`) and
/// round-trips any input, including empty and odd-length bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorCipher;

impl XorCipher {
    fn apply(key: &Key, data: &[u8]) -> Vec<u8> {
        let k = key.as_bytes();
        if k.is_empty() {
            return data.to_vec();
        }
        data.iter()
            .enumerate()
            .map(|(i, b)| b ^ k[i % k.len()])
            .collect()
    }
}

impl Cipher for XorCipher {
    fn encrypt(&self, key: &Key, plaintext: &[u8]) -> Vec<u8> {
        Self::apply(key, plaintext)
    }

    fn decrypt(&self, key: &Key, ciphertext: &[u8]) -> Vec<u8> {
        Self::apply(key, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_cipher_round_trips() {
        let key = Key::new(b"session-key".to_vec());
        let cipher = XorCipher;
        let plaintext = b"hello gate".to_vec();

        let ciphertext = cipher.encrypt(&key, &plaintext);
        assert_ne!(ciphertext, plaintext);

        let decrypted = cipher.decrypt(&key, &ciphertext);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn xor_cipher_handles_empty_body() {
        let key = Key::new(b"k".to_vec());
        let cipher = XorCipher;
        assert_eq!(cipher.encrypt(&key, &[]), Vec::<u8>::new());
    }

    #[test]
    fn xor_cipher_handles_empty_key() {
        let key = Key::new(Vec::new());
        let cipher = XorCipher;
        let data = b"unchanged".to_vec();
        assert_eq!(cipher.encrypt(&key, &data), data);
    }
}
