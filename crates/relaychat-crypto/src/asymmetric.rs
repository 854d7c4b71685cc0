//! RSA keypair used once per handshake to wrap the session key.

use std::fmt;

use rand::{CryptoRng, RngCore};
use rsa::{
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePublicKey, EncodePublicKey},
};

use crate::{CryptoError, decode_base64, encode_base64};

/// Modulus size of the endpoint's handshake keypair.
pub const RSA_KEY_BITS: usize = 2048;

/// RSA keypair owned by an endpoint for the duration of its handshake.
///
/// Dropped as soon as the session key has been recovered.
pub struct KeyPair {
    private: RsaPrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh [`RSA_KEY_BITS`]-bit keypair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CryptoError> {
        Self::generate_with_bits(rng, RSA_KEY_BITS)
    }

    /// Generate a keypair with a non-default modulus size.
    pub fn generate_with_bits<R: RngCore + CryptoRng>(
        rng: &mut R,
        bits: usize,
    ) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(rng, bits)?;
        let public = PublicKey(RsaPublicKey::from(&private));
        Ok(Self { private, public })
    }

    /// Public half, to be offered to the peer.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Decrypt a PKCS#1 v1.5 ciphertext addressed to this keypair.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.private.decrypt(Pkcs1v15Encrypt, ciphertext)?)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Peer public key, exchanged as base64 of its SPKI DER encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Standard DER (`SubjectPublicKeyInfo`) encoding.
    pub fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::PublicKey(e.to_string()))
    }

    /// Parse a DER (`SubjectPublicKeyInfo`) encoded RSA public key.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_der(der)
            .map(Self)
            .map_err(|e| CryptoError::PublicKey(e.to_string()))
    }

    /// DER encoding as a single base64 record.
    pub fn to_base64(&self) -> Result<String, CryptoError> {
        Ok(encode_base64(&self.to_der()?))
    }

    /// Parse a base64 record carrying a DER encoded public key.
    pub fn from_base64(record: &str) -> Result<Self, CryptoError> {
        Self::from_der(&decode_base64(record)?)
    }

    /// Encrypt `plaintext` under this key with PKCS#1 v1.5 padding.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        Ok(self.0.encrypt(rng, Pkcs1v15Encrypt, plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    // Small modulus keeps unit tests fast; the handshake tests use the default.
    const TEST_BITS: usize = 1024;

    #[test]
    fn public_key_survives_base64_transport() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let keypair = KeyPair::generate_with_bits(&mut rng, TEST_BITS).unwrap();

        let record = keypair.public_key().to_base64().unwrap();
        let parsed = PublicKey::from_base64(&record).unwrap();

        assert_eq!(&parsed, keypair.public_key());
    }

    #[test]
    fn encrypt_then_decrypt_with_matching_keypair() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let keypair = KeyPair::generate_with_bits(&mut rng, TEST_BITS).unwrap();

        let ciphertext = keypair.public_key().encrypt(&mut rng, b"sixteen byte key").unwrap();
        assert_eq!(keypair.decrypt(&ciphertext).unwrap(), b"sixteen byte key");
    }

    #[test]
    fn decrypt_with_other_keypair_fails() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let alice = KeyPair::generate_with_bits(&mut rng, TEST_BITS).unwrap();
        let bob = KeyPair::generate_with_bits(&mut rng, TEST_BITS).unwrap();

        let ciphertext = alice.public_key().encrypt(&mut rng, b"for alice").unwrap();
        assert!(matches!(bob.decrypt(&ciphertext), Err(CryptoError::Rsa(_))));
    }

    #[test]
    fn garbage_der_is_rejected() {
        let result = PublicKey::from_der(&[0x30, 0x03, 0x02, 0x01, 0x00]);
        assert!(matches!(result, Err(CryptoError::PublicKey(_))));
    }

    #[test]
    fn keypair_debug_hides_private_key() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let keypair = KeyPair::generate_with_bits(&mut rng, TEST_BITS).unwrap();
        let rendered = format!("{keypair:?}");
        assert!(!rendered.contains("private"));
    }
}
