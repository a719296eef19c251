//! At-rest obfuscation codec for the ledger blob.
//!
//! Each plaintext char at position `i` is written as `d + 1` filler chars
//! followed by the char itself, where `d` is the digit `key[i % key.len()]`.
//! Only the filler LENGTH matters for decoding; its content is random.
//!
//! This is scrambling, not encryption. Anyone holding the digit key (or
//! enough samples) can recover the plaintext.

use crate::{
    error::{LedgerError, LedgerResult},
    rng::FillerRng,
};

/// Characters the filler is drawn from.
pub const FILLER_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()_+-=[]{};:,.<>?";

/// A validated, non-empty string of decimal digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfuscationKey {
    digits: Vec<usize>,
    raw:    String,
}

impl ObfuscationKey {
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        if raw.is_empty() {
            return Err(LedgerError::InvalidKey { reason: "key is empty".into() });
        }
        let digits = raw
            .chars()
            .map(|c| {
                c.to_digit(10)
                    .map(|d| d as usize)
                    .ok_or_else(|| LedgerError::InvalidKey {
                        reason: format!("'{c}' is not a decimal digit"),
                    })
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        Ok(Self { digits, raw: raw.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Filler length for logical position `i`.
    fn padding_at(&self, i: usize) -> usize {
        self.digits[i % self.digits.len()] + 1
    }
}

/// Scramble `plain` with `key`, drawing filler from `rng`.
pub fn encode(plain: &str, key: &ObfuscationKey, rng: &mut FillerRng) -> String {
    let mut out = String::with_capacity(plain.len() * 6);
    for (i, c) in plain.chars().enumerate() {
        for _ in 0..key.padding_at(i) {
            out.push(rng.pick(FILLER_ALPHABET) as char);
        }
        out.push(c);
    }
    out
}

/// Recover the plaintext from `obfuscated`.
///
/// Fails with `MalformedCiphertext` when the input ends partway through a
/// segment; a truncated blob is never silently shortened.
pub fn decode(obfuscated: &str, key: &ObfuscationKey) -> LedgerResult<String> {
    let chars: Vec<char> = obfuscated.chars().collect();
    let mut out = String::with_capacity(chars.len() / 2);
    let mut cursor = 0;
    let mut position = 0;

    while cursor < chars.len() {
        let needed = key.padding_at(position) + 1;
        let remaining = chars.len() - cursor;
        if remaining < needed {
            return Err(LedgerError::MalformedCiphertext { position, needed, remaining });
        }
        cursor += needed;
        out.push(chars[cursor - 1]);
        position += 1;
    }

    Ok(out)
}
