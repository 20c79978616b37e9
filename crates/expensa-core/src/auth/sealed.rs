//! Authenticated encryption for session data at rest.
//!
//! The cipher key is derived from a caller-supplied secret with Argon2 and
//! a random per-write salt, then used with ChaCha20-Poly1305. Every write
//! gets a fresh salt and nonce.

use anyhow::{anyhow, Context, Result};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const SEALED_VERSION: u32 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// On-disk envelope. Binary fields are base64 so the file stays JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedEnvelope {
    pub version: u32,
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

fn derive_key(secret: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(secret, salt, &mut key)
        .map_err(|e| anyhow!("Failed to derive session key: {}", e))?;
    Ok(key)
}

pub fn seal(secret: &[u8], plaintext: &[u8]) -> Result<SealedEnvelope> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let key = derive_key(secret, &salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| anyhow!("Failed to encrypt session data: {}", e))?;

    Ok(SealedEnvelope {
        version: SEALED_VERSION,
        salt: STANDARD.encode(salt),
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

pub fn open(secret: &[u8], envelope: &SealedEnvelope) -> Result<Vec<u8>> {
    if envelope.version != SEALED_VERSION {
        return Err(anyhow!(
            "Unsupported session file version {}",
            envelope.version
        ));
    }

    let salt = STANDARD
        .decode(&envelope.salt)
        .context("Invalid salt in session file")?;
    let nonce = STANDARD
        .decode(&envelope.nonce)
        .context("Invalid nonce in session file")?;
    let ciphertext = STANDARD
        .decode(&envelope.ciphertext)
        .context("Invalid ciphertext in session file")?;

    if nonce.len() != NONCE_LEN {
        return Err(anyhow!("Invalid nonce length {}", nonce.len()));
    }

    let key = derive_key(secret, &salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| anyhow!("Session file failed authentication"))
}
