//! Enrollment records: validation, upsert, listing.

use crate::{parse_timestamp, Store, StoreError};
use chrono::{DateTime, Utc};
use rollcall_core::EnrollmentRecord;
use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

const PERSON_ID_MIN: usize = 2;
const PERSON_ID_MAX: usize = 20;
const DISPLAY_NAME_MIN: usize = 2;
const DISPLAY_NAME_MAX: usize = 50;

/// Identity metadata for one enrolled person, without the image payload.
#[derive(Debug, Clone, Serialize)]
pub struct PersonRow {
    pub person_id: String,
    pub display_name: String,
    pub enrolled_at: DateTime<Utc>,
}

impl Store {
    /// Insert or replace an enrollment. Returns the fresh enrollment id.
    ///
    /// Re-enrolling an existing person replaces their image and metadata in
    /// place; their position in scan order is unchanged.
    pub fn enroll(
        &self,
        person_id: &str,
        display_name: &str,
        image: &[u8],
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        validate_person_id(person_id)?;
        validate_display_name(display_name)?;

        let enrollment_id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO people (person_id, display_name, enrollment_id, enrolled_at, face_image)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(person_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 enrollment_id = excluded.enrollment_id,
                 enrolled_at = excluded.enrolled_at,
                 face_image = excluded.face_image",
            params![person_id, display_name, enrollment_id, now.to_rfc3339(), image],
        )?;
        tracing::info!(person_id, display_name, "enrollment stored");

        Ok(enrollment_id)
    }

    /// Delete an enrollment. The person's ledger history stays untouched.
    ///
    /// Returns false when the person was not enrolled.
    pub fn remove_person(&self, person_id: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM people WHERE person_id = ?1", params![person_id])?;
        if changed > 0 {
            tracing::info!(person_id, "enrollment removed");
        }
        Ok(changed > 0)
    }

    /// Identity metadata for every enrolled person, in scan order.
    pub fn people(&self) -> Result<Vec<PersonRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT person_id, display_name, enrolled_at FROM people ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut people = Vec::new();
        for row in rows {
            let (person_id, display_name, enrolled_at) = row?;
            people.push(PersonRow {
                person_id,
                display_name,
                enrolled_at: parse_timestamp(&enrolled_at)?,
            });
        }
        Ok(people)
    }

    /// Full enrollments with image payloads, in scan order, for a registry
    /// rebuild.
    pub fn enrollments(&self) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT enrollment_id, person_id, display_name, enrolled_at, face_image
             FROM people ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (enrollment_id, person_id, display_name, enrolled_at, image) = row?;
            records.push(EnrollmentRecord {
                enrollment_id,
                person_id,
                display_name,
                enrolled_at: parse_timestamp(&enrolled_at)?,
                image,
            });
        }
        Ok(records)
    }

    /// Number of enrolled people.
    pub fn person_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn validate_person_id(person_id: &str) -> Result<(), StoreError> {
    let len = person_id.chars().count();
    let charset_ok = person_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if len < PERSON_ID_MIN || len > PERSON_ID_MAX || !charset_ok {
        return Err(StoreError::InvalidPersonId(person_id.to_string()));
    }
    Ok(())
}

fn validate_display_name(display_name: &str) -> Result<(), StoreError> {
    let len = display_name.trim().chars().count();
    if len < DISPLAY_NAME_MIN || len > DISPLAY_NAME_MAX {
        return Err(StoreError::InvalidDisplayName);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_enroll_and_list() {
        let store = Store::open_in_memory().unwrap();
        store.enroll("alice", "Alice", b"img-a", now()).unwrap();
        store.enroll("bob", "Bob", b"img-b", now()).unwrap();

        let people = store.people().unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].person_id, "alice");
        assert_eq!(people[1].person_id, "bob");
        assert_eq!(store.person_count().unwrap(), 2);
    }

    #[test]
    fn test_enrollments_carry_image_payload() {
        let store = Store::open_in_memory().unwrap();
        let id = store.enroll("alice", "Alice", b"payload", now()).unwrap();

        let records = store.enrollments().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].enrollment_id, id);
        assert_eq!(records[0].image, b"payload");
    }

    #[test]
    fn test_reenroll_replaces_in_place() {
        let store = Store::open_in_memory().unwrap();
        let first = store.enroll("alice", "Alice", b"old", now()).unwrap();
        store.enroll("bob", "Bob", b"img-b", now()).unwrap();
        let second = store.enroll("alice", "Alice B.", b"new", now()).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.person_count().unwrap(), 2);

        let records = store.enrollments().unwrap();
        // Scan order is preserved across the upsert.
        assert_eq!(records[0].person_id, "alice");
        assert_eq!(records[0].display_name, "Alice B.");
        assert_eq!(records[0].image, b"new");
        assert_eq!(records[1].person_id, "bob");
    }

    #[test]
    fn test_remove_person() {
        let store = Store::open_in_memory().unwrap();
        store.enroll("alice", "Alice", b"img", now()).unwrap();

        assert!(store.remove_person("alice").unwrap());
        assert!(!store.remove_person("alice").unwrap());
        assert_eq!(store.person_count().unwrap(), 0);
    }

    #[test]
    fn test_person_id_validation() {
        let store = Store::open_in_memory().unwrap();
        for bad in ["", "a", "a".repeat(21).as_str(), "no spaces", "bad!", "semi;colon"] {
            let err = store.enroll(bad, "Valid Name", b"img", now()).unwrap_err();
            assert!(matches!(err, StoreError::InvalidPersonId(_)), "accepted {bad:?}");
        }
        for good in ["ab", "alice_1", "A-B_c9", "a".repeat(20).as_str()] {
            store.enroll(good, "Valid Name", b"img", now()).unwrap();
        }
    }

    #[test]
    fn test_display_name_validation() {
        let store = Store::open_in_memory().unwrap();
        for bad in ["", "x", "   ", "y".repeat(51).as_str()] {
            let err = store.enroll("alice", bad, b"img", now()).unwrap_err();
            assert!(matches!(err, StoreError::InvalidDisplayName), "accepted {bad:?}");
        }
        store.enroll("alice", "Jo", b"img", now()).unwrap();
        store.enroll("bob", "y".repeat(50).as_str(), b"img", now()).unwrap();
    }
}
