use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Journal error: {0}")]
    Journal(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed ciphertext at position {position}: needed {needed} chars, {remaining} remaining")]
    MalformedCiphertext {
        position:  usize,
        needed:    usize,
        remaining: usize,
    },

    #[error("Invalid obfuscation key: {reason}")]
    InvalidKey { reason: String },

    #[error("Malformed record '{line}': {reason}")]
    MalformedRecord { line: String, reason: String },

    #[error("Malformed command '{command}': {reason}")]
    MalformedCommand { command: String, reason: String },

    #[error("Billing fetch failed: {reason}")]
    Billing { reason: String },

    #[error("Message envelope rejected: {reason}")]
    Envelope { reason: String },

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
