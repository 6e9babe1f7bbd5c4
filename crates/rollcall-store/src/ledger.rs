//! The append-only attendance ledger.

use crate::{parse_timestamp, Store, StoreError};
use rollcall_core::{next_kind, AttendanceEvent, EventKind};
use rusqlite::{params, OptionalExtension};

impl Store {
    /// Durably append one event to the ledger.
    ///
    /// The last-kind cache is updated only after the insert succeeded, so a
    /// failed append leaves both the ledger and the cache unchanged.
    pub fn append(&mut self, event: &AttendanceEvent) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO attendance (recorded_at, person_id, display_name, kind)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.recorded_at.to_rfc3339(),
                event.person_id,
                event.display_name,
                event.kind.as_str(),
            ],
        )?;
        self.last_kind.insert(event.person_id.clone(), event.kind);
        Ok(())
    }

    /// Kind the next event for `person_id` must carry: ENTRY for a person
    /// with no history, otherwise the opposite of their latest event.
    ///
    /// Answered from the last-kind cache when warm; on a miss the ledger
    /// tail is scanned and the cache primed. The ledger is authoritative,
    /// the cache never survives a restart.
    pub fn determine_next_kind(&mut self, person_id: &str) -> Result<EventKind, StoreError> {
        if let Some(&kind) = self.last_kind.get(person_id) {
            return Ok(next_kind(Some(kind)));
        }

        let last = self.last_recorded_kind(person_id)?;
        if let Some(kind) = last {
            self.last_kind.insert(person_id.to_string(), kind);
        }
        Ok(next_kind(last))
    }

    fn last_recorded_kind(&self, person_id: &str) -> Result<Option<EventKind>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT kind FROM attendance WHERE person_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![person_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(kind) => Ok(Some(kind.parse()?)),
            None => Ok(None),
        }
    }

    /// Every ledger event, in append order.
    pub fn read_all(&self) -> Result<Vec<AttendanceEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT recorded_at, person_id, display_name, kind
             FROM attendance ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (recorded_at, person_id, display_name, kind) = row?;
            events.push(AttendanceEvent {
                recorded_at: parse_timestamp(&recorded_at)?,
                person_id,
                display_name,
                kind: kind.parse()?,
            });
        }
        Ok(events)
    }

    /// Number of ledger rows.
    pub fn event_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rollcall_core::CooldownTracker;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(person: &str, kind: EventKind, secs: i64) -> AttendanceEvent {
        AttendanceEvent {
            recorded_at: at(secs),
            person_id: person.to_string(),
            display_name: person.to_uppercase(),
            kind,
        }
    }

    #[test]
    fn test_append_then_read_preserves_order() {
        let mut store = Store::open_in_memory().unwrap();
        store.append(&event("alice", EventKind::Entry, 0)).unwrap();
        store.append(&event("bob", EventKind::Entry, 1)).unwrap();
        store.append(&event("alice", EventKind::Exit, 2)).unwrap();

        let events = store.read_all().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].person_id, "alice");
        assert_eq!(events[0].kind, EventKind::Entry);
        assert_eq!(events[1].person_id, "bob");
        assert_eq!(events[2].kind, EventKind::Exit);
        assert_eq!(events[0].recorded_at, at(0));
        assert_eq!(store.event_count().unwrap(), 3);
    }

    #[test]
    fn test_next_kind_starts_with_entry_and_alternates() {
        let mut store = Store::open_in_memory().unwrap();
        assert_eq!(store.determine_next_kind("alice").unwrap(), EventKind::Entry);

        store.append(&event("alice", EventKind::Entry, 0)).unwrap();
        assert_eq!(store.determine_next_kind("alice").unwrap(), EventKind::Exit);

        store.append(&event("alice", EventKind::Exit, 1)).unwrap();
        assert_eq!(store.determine_next_kind("alice").unwrap(), EventKind::Entry);
    }

    #[test]
    fn test_next_kind_is_per_person() {
        let mut store = Store::open_in_memory().unwrap();
        store.append(&event("alice", EventKind::Entry, 0)).unwrap();

        assert_eq!(store.determine_next_kind("alice").unwrap(), EventKind::Exit);
        assert_eq!(store.determine_next_kind("bob").unwrap(), EventKind::Entry);
    }

    #[test]
    fn test_next_kind_from_cold_cache_scans_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");

        {
            let mut store = Store::open(&path).unwrap();
            store.append(&event("alice", EventKind::Entry, 0)).unwrap();
        }

        // A fresh instance has an empty cache and must derive from the log.
        let mut store = Store::open(&path).unwrap();
        assert!(store.last_kind.is_empty());
        assert_eq!(store.determine_next_kind("alice").unwrap(), EventKind::Exit);
        assert_eq!(store.last_kind.get("alice"), Some(&EventKind::Entry));
    }

    #[test]
    fn test_failed_append_leaves_cache_unchanged() {
        let mut store = Store::open_in_memory().unwrap();
        store.conn.execute_batch("DROP TABLE attendance").unwrap();

        let err = store.append(&event("alice", EventKind::Entry, 0));
        assert!(err.is_err());
        assert!(store.last_kind.is_empty());
    }

    #[test]
    fn test_failed_append_leaves_cooldown_unset() {
        let mut store = Store::open_in_memory().unwrap();
        let mut cooldown = CooldownTracker::new(Duration::seconds(5));

        // One recorded sighting, then a broken ledger.
        store.append(&event("alice", EventKind::Entry, 0)).unwrap();
        cooldown.record_seen("alice", at(0));
        store.conn.execute_batch("DROP TABLE attendance").unwrap();

        // The recording sequence marks the cooldown only after a successful
        // append, so a failed write opens no new window and the next
        // sighting retries.
        assert!(!cooldown.should_suppress("alice", at(10)));
        let kind = store.determine_next_kind("alice").unwrap();
        assert_eq!(kind, EventKind::Exit);
        assert!(store.append(&event("alice", kind, 10)).is_err());
        assert!(!cooldown.should_suppress("alice", at(11)));
    }

    #[test]
    fn test_removed_person_history_survives() {
        let mut store = Store::open_in_memory().unwrap();
        store.enroll("alice", "Alice", b"img", at(0)).unwrap();
        store.append(&event("alice", EventKind::Entry, 1)).unwrap();
        store.remove_person("alice").unwrap();

        assert_eq!(store.event_count().unwrap(), 1);
        // Alternation continues from the recorded history.
        assert_eq!(store.determine_next_kind("alice").unwrap(), EventKind::Exit);
    }

    #[test]
    fn test_ledger_rejects_unknown_kind_at_sql_level() {
        let store = Store::open_in_memory().unwrap();
        let result = store.conn.execute(
            "INSERT INTO attendance (recorded_at, person_id, display_name, kind)
             VALUES ('2025-03-10T09:00:00Z', 'alice', 'ALICE', 'LUNCH')",
            [],
        );
        assert!(result.is_err());
    }
}
