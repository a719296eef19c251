//! Ledger events: the audit trail of every state change.
//!
//! RULE: every successful mutation and every reconciliation outcome is
//! recorded as exactly one LedgerEvent in the journal.
//! Variants are only ever appended.

use crate::types::{Cents, Credits, Email, PassId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // ── Request handler ────────────────────────────
    RecordAdded {
        email: Email,
        tier:  String,
    },
    ExemptRecordAdded {
        email: Email,
    },
    AddonRedeemed {
        email:             Email,
        addon:             String,
        credits_remaining: Credits,
    },
    GameIdLinked {
        email:     Email,
        namespace: String,
        game_id:   String,
    },
    RecordsForceRemoved {
        credential: String,
        removed:    usize,
    },

    // ── Reconciliation ─────────────────────────────
    SubscriberPruned {
        pass_id: PassId,
        email:   Email,
    },
    CreditGranted {
        pass_id:     PassId,
        email:       Email,
        cents_delta: Cents,
        credits:     Credits,
    },
    ReconciliationCompleted {
        pass_id:  PassId,
        kept:     usize,
        pruned:   usize,
        credited: usize,
    },
    ReconciliationAborted {
        pass_id: PassId,
        reason:  String,
    },
}

impl LedgerEvent {
    /// Stable name stored in the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RecordAdded { .. }             => "record_added",
            Self::ExemptRecordAdded { .. }       => "exempt_record_added",
            Self::AddonRedeemed { .. }           => "addon_redeemed",
            Self::GameIdLinked { .. }            => "game_id_linked",
            Self::RecordsForceRemoved { .. }     => "records_force_removed",
            Self::SubscriberPruned { .. }        => "subscriber_pruned",
            Self::CreditGranted { .. }           => "credit_granted",
            Self::ReconciliationCompleted { .. } => "reconciliation_completed",
            Self::ReconciliationAborted { .. }   => "reconciliation_aborted",
        }
    }
}

/// One persisted journal row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id:          Option<i64>,
    pub recorded_at: String,
    pub event_type:  String,
    pub payload:     String,
}

impl JournalEntry {
    pub fn event(&self) -> serde_json::Result<LedgerEvent> {
        serde_json::from_str(&self.payload)
    }
}
