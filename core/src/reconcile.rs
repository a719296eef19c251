//! Reconciliation: prunes lapsed subscribers and grants credits for new
//! payment, against the billing source of truth.
//!
//! PASS ORDER (fixed):
//!   0. Skip: nothing to do while the ledger has no records
//!   1. Fetch: subscriber summaries from billing (outside the lock)
//!   2. Prune: Standard records whose email is not an active subscriber
//!   3. Grant: +1 credit when lifetime cents grew by MORE than the
//!      threshold since the previous snapshot
//!   4. Commit: ledger and snapshot replaced with the same content
//!
//! RULES:
//!   - Exempt records are never pruned, refreshed or credited.
//!   - Unreadable ledger lines are carried through untouched.
//!   - An unreadable snapshot counts as no snapshot: the pass grants nothing.
//!   - A record gains at most one credit per pass; credits never decrease.
//!   - Any failure ends the pass with nothing persisted.
//!   - Records are matched by exact email, never by substring.

use crate::{
    billing::{BillingSource, SubscriberSummary},
    config::ReconciliationConfig,
    error::LedgerResult,
    event::LedgerEvent,
    record::{EntitlementRecord, LedgerLine},
    store::{LedgerStore, SharedLedger},
    types::{Cents, Email, PassId},
};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub pass_id:  PassId,
    pub kept:     usize,
    pub pruned:   Vec<Email>,
    pub credited: Vec<Email>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The ledger was empty; billing was not contacted.
    Skipped,
    /// Nothing was written.
    Aborted { pass_id: PassId, reason: String },
    Completed(ReconcileSummary),
}

pub struct Reconciler {
    ledger:                 SharedLedger,
    billing:                Box<dyn BillingSource>,
    credit_threshold_cents: Cents,
}

impl Reconciler {
    pub fn new(
        ledger: SharedLedger,
        billing: Box<dyn BillingSource>,
        config: &ReconciliationConfig,
    ) -> Self {
        Self {
            ledger,
            billing,
            credit_threshold_cents: config.credit_threshold_cents,
        }
    }

    /// Run one full pass. Never panics or propagates; the outcome says
    /// what happened and failures are logged and journaled.
    pub fn run_pass(&self) -> PassOutcome {
        let pass_id = uuid::Uuid::new_v4().to_string();

        match self.ledger.transact(|store| store.load_records()) {
            Ok(Ok(records)) if records.is_empty() => {
                log::debug!("reconcile {pass_id}: ledger empty, skipping");
                return PassOutcome::Skipped;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) | Err(e) => {
                return self.abort(pass_id, format!("cannot load ledger: {e}"));
            }
        }

        let subscribers = match self.billing.fetch_subscribers() {
            Ok(subscribers) if subscribers.is_empty() => {
                return self.abort(pass_id, "billing returned no subscribers".into());
            }
            Ok(subscribers) => subscribers,
            Err(e) => return self.abort(pass_id, e.to_string()),
        };

        let committed = self
            .ledger
            .transact(|store| self.reconcile_locked(store, &pass_id, &subscribers));
        match committed {
            Ok(Ok(summary)) => PassOutcome::Completed(summary),
            Ok(Err(e)) | Err(e) => self.abort(pass_id, e.to_string()),
        }
    }

    fn reconcile_locked(
        &self,
        store: &mut LedgerStore,
        pass_id: &str,
        subscribers: &[SubscriberSummary],
    ) -> LedgerResult<ReconcileSummary> {
        let lines = store.load_lines()?;
        let snapshot = match store.load_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("reconcile {pass_id}: snapshot unreadable, treating as absent: {e}");
                None
            }
        };
        let active = active_subscribers(subscribers);
        let mut events = Vec::new();

        // ── 2. Prune ──────────────────────────────────────────────
        let (mut kept, dropped): (Vec<LedgerLine>, Vec<LedgerLine>) =
            lines.into_iter().partition(|line| match line {
                LedgerLine::Record(r) => r.is_exempt() || active.contains_key(r.email.as_str()),
                LedgerLine::Raw(_) => true,
            });

        let pruned: Vec<Email> = dropped
            .into_iter()
            .filter_map(LedgerLine::into_record)
            .map(|r| r.email)
            .collect();
        for email in &pruned {
            log::info!("reconcile {pass_id}: {email} removed, not an active subscriber");
            events.push(LedgerEvent::SubscriberPruned {
                pass_id: pass_id.to_string(),
                email:   email.clone(),
            });
        }

        // ── 3. Grant credits ──────────────────────────────────────
        let previous = match &snapshot {
            Some(records) => snapshot_cents(records),
            None => {
                log::info!("reconcile {pass_id}: no snapshot yet, first pass grants nothing");
                HashMap::new()
            }
        };

        let mut credited = Vec::new();
        let standard = kept
            .iter_mut()
            .filter_map(LedgerLine::record_mut)
            .filter(|r| !r.is_exempt());
        for record in standard {
            let Some(subscriber) = active.get(record.email.as_str()) else {
                continue;
            };
            if subscriber.lifetime_cents_paid < record.cents_paid {
                log::warn!(
                    "reconcile {pass_id}: billing reports {} cents for {}, ledger has {}; keeping ledger value",
                    subscriber.lifetime_cents_paid,
                    record.email,
                    record.cents_paid,
                );
            } else {
                record.cents_paid = subscriber.lifetime_cents_paid;
            }

            // First sighting: nothing to compare against.
            let Some(&before) = previous.get(record.email.as_str()) else {
                continue;
            };
            let delta = record.cents_paid.saturating_sub(before);
            if delta > self.credit_threshold_cents {
                let old = record.credits;
                record.credits = record.credits.saturating_add(1);
                log::info!(
                    "reconcile {pass_id}: credits {old} -> {} for {} (+{delta} cents)",
                    record.credits,
                    record.email,
                );
                events.push(LedgerEvent::CreditGranted {
                    pass_id:     pass_id.to_string(),
                    email:       record.email.clone(),
                    cents_delta: delta,
                    credits:     record.credits,
                });
                credited.push(record.email.clone());
            }
        }

        // ── 4. Commit & snapshot ──────────────────────────────────
        store.commit_pass(&kept)?;

        let summary = ReconcileSummary {
            pass_id: pass_id.to_string(),
            kept: kept.iter().filter(|l| l.record().is_some()).count(),
            pruned,
            credited,
        };
        events.push(LedgerEvent::ReconciliationCompleted {
            pass_id:  summary.pass_id.clone(),
            kept:     summary.kept,
            pruned:   summary.pruned.len(),
            credited: summary.credited.len(),
        });
        for event in &events {
            store.journal().record(event);
        }

        log::info!(
            "reconcile {pass_id}: kept={} pruned={} credited={}",
            summary.kept,
            summary.pruned.len(),
            summary.credited.len(),
        );
        Ok(summary)
    }

    fn abort(&self, pass_id: PassId, reason: String) -> PassOutcome {
        log::error!("reconcile {pass_id}: aborted: {reason}");
        let event = LedgerEvent::ReconciliationAborted {
            pass_id: pass_id.clone(),
            reason:  reason.clone(),
        };
        if let Err(e) = self.ledger.transact(|store| store.journal().record(&event)) {
            log::warn!("reconcile {pass_id}: cannot journal abort: {e}");
        }
        PassOutcome::Aborted { pass_id, reason }
    }
}

/// Active subscribers by email. Duplicate entries keep the highest payment.
fn active_subscribers(subscribers: &[SubscriberSummary]) -> HashMap<&str, &SubscriberSummary> {
    let mut active: HashMap<&str, &SubscriberSummary> = HashMap::new();
    for s in subscribers.iter().filter(|s| s.is_active()) {
        active
            .entry(s.email.as_str())
            .and_modify(|existing| {
                if s.lifetime_cents_paid > existing.lifetime_cents_paid {
                    *existing = s;
                }
            })
            .or_insert(s);
    }
    active
}

/// Cents paid per email in the previous snapshot (first Standard record wins).
fn snapshot_cents(records: &[EntitlementRecord]) -> HashMap<&str, Cents> {
    let mut cents = HashMap::new();
    for r in records.iter().filter(|r| !r.is_exempt()) {
        cents.entry(r.email.as_str()).or_insert(r.cents_paid);
    }
    cents
}
