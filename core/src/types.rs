//! Shared primitive types used across the ledger.

/// Account email; the identity key of a Standard record.
pub type Email = String;

/// Lifetime payment amount in cents.
pub type Cents = u64;

/// Redeemable credit balance.
pub type Credits = u32;

/// Identifier for one reconciliation pass, carried into the journal.
pub type PassId = String;
