//! SQLite audit journal.
//!
//! RULE: Only journal.rs talks to the database.
//! The handler and the reconciler append LedgerEvents through it; they never
//! execute SQL directly. The journal is an audit trail, not a source of truth:
//! the ledger file stays authoritative.

use crate::{
    error::LedgerResult,
    event::{JournalEntry, LedgerEvent},
};
use rusqlite::{params, Connection};

pub struct Journal {
    conn: Connection,
}

impl Journal {
    /// Open (or create) the journal database at `path` and migrate it.
    /// `:memory:` yields a private in-memory journal.
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; in-memory ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        let journal = Self { conn };
        journal.migrate()?;
        Ok(journal)
    }

    /// Open an in-memory journal (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        Self::open(":memory:")
    }

    fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_journal.sql"))?;
        Ok(())
    }

    pub fn append(&self, event: &LedgerEvent) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO journal (recorded_at, event_type, payload) VALUES (?1, ?2, ?3)",
            params![
                chrono::Utc::now().to_rfc3339(),
                event.type_name(),
                serde_json::to_string(event)?,
            ],
        )?;
        Ok(())
    }

    /// Append and swallow failures; the ledger commit already happened.
    pub fn record(&self, event: &LedgerEvent) {
        if let Err(e) = self.append(event) {
            log::warn!("journal append failed for {}: {e}", event.type_name());
        }
    }

    pub fn entries(&self) -> LedgerResult<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recorded_at, event_type, payload FROM journal ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(JournalEntry {
                    id:          Some(row.get(0)?),
                    recorded_at: row.get(1)?,
                    event_type:  row.get(2)?,
                    payload:     row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn count_by_type(&self, event_type: &str) -> LedgerResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM journal WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_events_read_back_in_order() {
        let journal = Journal::in_memory().unwrap();
        journal
            .append(&LedgerEvent::RecordAdded { email: "a@x.com".into(), tier: "t1".into() })
            .unwrap();
        journal
            .append(&LedgerEvent::RecordsForceRemoved { credential: "a@x.com".into(), removed: 1 })
            .unwrap();

        let entries = journal.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event_type, "record_added");
        assert_eq!(entries[1].event_type, "records_force_removed");
        assert_eq!(
            entries[1].event().unwrap(),
            LedgerEvent::RecordsForceRemoved { credential: "a@x.com".into(), removed: 1 }
        );
        assert_eq!(journal.count_by_type("record_added").unwrap(), 1);
    }
}
