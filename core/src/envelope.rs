//! Message confidentiality for the datagram transport.
//!
//! Wire form: base64(nonce || AES-256-GCM ciphertext). A fresh random nonce is
//! drawn for every sealed message; the tag authenticates the command, so a
//! datagram that opens cleanly came from a holder of the message key.

use crate::error::{LedgerError, LedgerResult};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct MessageEnvelope {
    cipher: Aes256Gcm,
}

impl MessageEnvelope {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)) }
    }

    /// Build from the base64 key stored in configuration.
    pub fn from_base64_key(encoded: &str) -> LedgerResult<Self> {
        let raw = BASE64
            .decode(encoded.trim().as_bytes())
            .map_err(|e| envelope_error(format!("message key is not base64: {e}")))?;
        if raw.len() != KEY_LEN {
            return Err(envelope_error(format!(
                "message key must be {KEY_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&raw);
        Ok(Self::new(&key))
    }

    pub fn seal(&self, plain: &str) -> LedgerResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plain.as_bytes())
            .map_err(|_| envelope_error("encryption failed"))?;

        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(framed))
    }

    pub fn open(&self, sealed: &str) -> LedgerResult<String> {
        let framed = BASE64
            .decode(sealed.trim().as_bytes())
            .map_err(|e| envelope_error(format!("not base64: {e}")))?;
        if framed.len() <= NONCE_LEN {
            return Err(envelope_error("message shorter than nonce"));
        }
        let (nonce, ciphertext) = framed.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| envelope_error("authentication failed"))?;
        String::from_utf8(plain).map_err(|_| envelope_error("plaintext is not UTF-8"))
    }
}

fn envelope_error(reason: impl Into<String>) -> LedgerError {
    LedgerError::Envelope { reason: reason.into() }
}
