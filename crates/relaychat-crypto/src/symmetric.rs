//! AES-128 session key and the line cipher built on it.

use std::fmt;

use aes::{
    Aes128,
    cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, block_padding::Pkcs7, generic_array::GenericArray},
};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::{CryptoError, decode_base64, encode_base64};

/// Length of a session key in bytes.
pub const SESSION_KEY_LEN: usize = 16;

type Aes128EcbEnc = ecb::Encryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;

/// Symmetric key protecting all post-handshake traffic on one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Fresh random key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut key = [0u8; SESSION_KEY_LEN];
        rng.fill_bytes(&mut key);
        Self(key)
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a key from the first [`SESSION_KEY_LEN`] bytes of `material`.
    ///
    /// Longer material is truncated, shorter material is zero-padded. No
    /// derivation is applied.
    pub fn from_material(material: &[u8]) -> Self {
        let mut key = [0u8; SESSION_KEY_LEN];
        let n = material.len().min(SESSION_KEY_LEN);
        key[..n].copy_from_slice(&material[..n]);
        Self(key)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Per-connection line cipher.
///
/// Cloned into both the connection actor (decrypting what the peer sends) and
/// the registry record the coordinator encrypts with.
#[derive(Clone, Debug)]
pub struct SessionCipher {
    key: SessionKey,
}

impl SessionCipher {
    /// Cipher over the given session key.
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    /// Session key this cipher encrypts under.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Encrypt UTF-8 text into one base64 record.
    pub fn encrypt(&self, plaintext: &str) -> String {
        encode_base64(&self.encrypt_bytes(plaintext.as_bytes()))
    }

    /// Decrypt one base64 record into UTF-8 text.
    pub fn decrypt(&self, record: &str) -> Result<String, CryptoError> {
        let ciphertext = decode_base64(record)?;
        Ok(String::from_utf8(self.decrypt_bytes(&ciphertext)?)?)
    }

    fn encrypt_bytes(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128EcbEnc::new(GenericArray::from_slice(self.key.as_bytes()))
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    fn decrypt_bytes(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Aes128EcbDec::new(GenericArray::from_slice(self.key.as_bytes()))
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::Padding)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn known_answer_matches_aes_128_ecb_pkcs7() {
        // FIPS-197 appendix C.1 key and plaintext; the second block is pure padding.
        let key = SessionKey::from_bytes([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ]);
        let plaintext = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        let cipher = SessionCipher::new(key);

        let ciphertext = cipher.encrypt_bytes(&plaintext);

        assert_eq!(ciphertext.len(), 32);
        assert_eq!(&ciphertext[..16], &[
            0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4,
            0xc5, 0x5a
        ]);
    }

    #[test]
    fn text_survives_encrypt_decrypt() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let cipher = SessionCipher::new(SessionKey::generate(&mut rng));

        let record = cipher.encrypt("olá, relay");
        assert_eq!(cipher.decrypt(&record).unwrap(), "olá, relay");
    }

    #[test]
    fn different_keys_produce_different_records() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let a = SessionCipher::new(SessionKey::generate(&mut rng));
        let b = SessionCipher::new(SessionKey::generate(&mut rng));

        assert_ne!(a.encrypt("hello"), b.encrypt("hello"));
    }

    #[test]
    fn wrong_key_fails_or_garbles() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let a = SessionCipher::new(SessionKey::generate(&mut rng));
        let b = SessionCipher::new(SessionKey::generate(&mut rng));

        let record = a.encrypt("secret");
        // PKCS#7 occasionally accepts a wrong-key block; it never yields the plaintext.
        if let Ok(text) = b.decrypt(&record) {
            assert_ne!(text, "secret");
        }
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let cipher = SessionCipher::new(SessionKey::from_bytes([7; SESSION_KEY_LEN]));
        let record = encode_base64(&[1, 2, 3]);
        assert!(matches!(cipher.decrypt(&record), Err(CryptoError::Padding)));
    }

    #[test]
    fn session_key_debug_is_redacted() {
        let key = SessionKey::from_bytes([0xAB; SESSION_KEY_LEN]);
        assert_eq!(format!("{key:?}"), "SessionKey(..)");
    }

    proptest! {
        /// Property: session key is always 16 bytes, a prefix of the material
        /// followed by zeros
        #[test]
        fn prop_session_key_from_any_material(material in prop::collection::vec(any::<u8>(), 0..300)) {
            let key = SessionKey::from_material(&material);
            let n = material.len().min(SESSION_KEY_LEN);

            prop_assert_eq!(key.as_bytes().len(), SESSION_KEY_LEN);
            prop_assert_eq!(&key.as_bytes()[..n], &material[..n]);
            prop_assert!(key.as_bytes()[n..].iter().all(|&b| b == 0));
        }

        /// Property: any UTF-8 text decrypts back under the same key
        #[test]
        fn prop_cipher_preserves_text(seed in any::<u64>(), text in ".*") {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let cipher = SessionCipher::new(SessionKey::generate(&mut rng));

            prop_assert_eq!(cipher.decrypt(&cipher.encrypt(&text))?, text);
        }
    }
}
