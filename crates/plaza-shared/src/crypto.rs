use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::StaticSecret;

use crate::constants::{KDF_CONTEXT_DM_KEY, NONCE_SIZE, PUBKEY_SIZE};
use crate::error::{CryptoError, KeyError};

pub use x25519_dalek::PublicKey;

/// 256-bit symmetric key derived from an ECDH shared secret.
///
/// Never persisted; recomputed for every encrypt/decrypt call.
pub type SharedSecret = [u8; 32];

/// A device's long-lived x25519 keypair.
///
/// The secret half stays in the device key store; the public half is
/// published to the key directory under the owning user id.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a keypair from stored secret bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Derive the symmetric key shared with `peer`.
    ///
    /// The raw ECDH output is passed through a BLAKE3 derive-key context so
    /// the cipher key is uniform and domain-separated. Both sides of a pair
    /// compute the same key.
    pub fn shared_secret(&self, peer: &PublicKey) -> SharedSecret {
        let dh = self.secret.diffie_hellman(peer);
        blake3::derive_key(KDF_CONTEXT_DM_KEY, dh.as_bytes())
    }
}

/// Parse an x25519 public key from raw bytes (key directory or wire form).
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    let arr: [u8; PUBKEY_SIZE] = bytes.try_into().map_err(|_| KeyError::InvalidKeyBytes)?;
    Ok(PublicKey::from(arr))
}

/// Ciphertext plus the nonce it was sealed with.
///
/// The wire schema carries the two as separate fields, so they are kept
/// apart here instead of concatenated into one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Seal `plaintext` under a fresh random nonce.
pub fn encrypt(key: &SharedSecret, plaintext: &[u8]) -> Result<EncryptedPayload, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedPayload {
        ciphertext,
        nonce: nonce_bytes,
    })
}

/// Open a sealed payload.
///
/// Fails on any authentication mismatch and never returns partial
/// plaintext.
pub fn decrypt(key: &SharedSecret, payload: &EncryptedPayload) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(&payload.nonce);

    cipher
        .decrypt(nonce, payload.ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}
