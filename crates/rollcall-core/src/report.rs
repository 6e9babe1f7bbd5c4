//! Attendance summarization: dwell-time pairing and CSV rendering.

use crate::event::{AttendanceEvent, EventKind};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-person attendance summary over a report window.
#[derive(Debug, Clone, Serialize)]
pub struct PersonSummary {
    pub person_id: String,
    pub display_name: String,
    pub entries: u32,
    pub exits: u32,
    /// Total paired ENTRY-to-EXIT dwell time in hours, rounded to 2 decimals.
    pub dwell_hours: f64,
    pub first_event: NaiveDate,
    pub last_event: NaiveDate,
    pub total_events: u32,
}

/// Aggregated attendance for an inclusive date range.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub generated_at: DateTime<Utc>,
    /// One summary per person with events in range, sorted by person id.
    pub people: Vec<PersonSummary>,
    /// People with at least one event in range.
    pub active_people: usize,
    pub total_entries: u32,
    pub total_exits: u32,
    pub total_dwell_hours: f64,
    /// Mean dwell hours per active person (0 when nobody was seen).
    pub mean_dwell_hours: f64,
}

/// Summarize the events whose UTC date falls inside `[start, end]`.
///
/// Dwell time pairs each ENTRY with the earliest not-yet-consumed EXIT
/// strictly after it. An ENTRY with no later EXIT contributes nothing; an
/// EXIT with no earlier ENTRY stays in the exit tally but never pairs.
pub fn summarize(events: &[AttendanceEvent], start: NaiveDate, end: NaiveDate) -> AttendanceReport {
    let mut by_person: BTreeMap<&str, Vec<&AttendanceEvent>> = BTreeMap::new();
    for event in events {
        let date = event.recorded_at.date_naive();
        if date < start || date > end {
            continue;
        }
        by_person.entry(event.person_id.as_str()).or_default().push(event);
    }

    let mut people = Vec::with_capacity(by_person.len());
    let mut total_entries = 0u32;
    let mut total_exits = 0u32;
    let mut total_dwell = 0.0f64;

    for (person_id, person_events) in by_person {
        let summary = summarize_person(person_id, &person_events);
        total_entries += summary.entries;
        total_exits += summary.exits;
        total_dwell += summary.dwell_hours;
        people.push(summary);
    }

    let active_people = people.len();
    let mean_dwell_hours = if active_people > 0 {
        round2(total_dwell / active_people as f64)
    } else {
        0.0
    };

    AttendanceReport {
        start,
        end,
        generated_at: Utc::now(),
        people,
        active_people,
        total_entries,
        total_exits,
        total_dwell_hours: round2(total_dwell),
        mean_dwell_hours,
    }
}

fn summarize_person(person_id: &str, events: &[&AttendanceEvent]) -> PersonSummary {
    let mut entries: Vec<DateTime<Utc>> = Vec::new();
    let mut exits: Vec<DateTime<Utc>> = Vec::new();
    for event in events {
        match event.kind {
            EventKind::Entry => entries.push(event.recorded_at),
            EventKind::Exit => exits.push(event.recorded_at),
        }
    }
    let entry_count = entries.len() as u32;
    let exit_count = exits.len() as u32;
    entries.sort();

    // Greedy pairing: each entry consumes the earliest exit after it, so an
    // unterminated entry or a leading orphan exit never inflates dwell time.
    let mut dwell = 0.0f64;
    for &entry_at in &entries {
        let candidate = exits
            .iter()
            .enumerate()
            .filter(|(_, &exit_at)| exit_at > entry_at)
            .min_by_key(|(_, &exit_at)| exit_at)
            .map(|(i, _)| i);
        if let Some(i) = candidate {
            let exit_at = exits.remove(i);
            dwell += (exit_at - entry_at).num_milliseconds() as f64 / 3_600_000.0;
        }
    }

    // events is non-empty by construction; fall back to epoch rather than panic.
    let fallback = DateTime::<Utc>::UNIX_EPOCH;
    let first = events.iter().map(|e| e.recorded_at).min().unwrap_or(fallback);
    let last = events.iter().map(|e| e.recorded_at).max().unwrap_or(fallback);

    PersonSummary {
        person_id: person_id.to_string(),
        display_name: events
            .first()
            .map(|e| e.display_name.clone())
            .unwrap_or_default(),
        entries: entry_count,
        exits: exit_count,
        dwell_hours: round2(dwell),
        first_event: first.date_naive(),
        last_event: last.date_naive(),
        total_events: events.len() as u32,
    }
}

fn round2(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

/// Render events as the detailed CSV exchanged with external tooling.
///
/// Columns: recorded_at (RFC 3339), person_id, display_name, type.
pub fn events_csv(events: &[AttendanceEvent]) -> String {
    let mut out = String::from("recorded_at,person_id,display_name,type\n");
    for event in events {
        out.push_str(&format!(
            "{},{},{},{}\n",
            event.recorded_at.to_rfc3339(),
            csv_field(&event.person_id),
            csv_field(&event.display_name),
            event.kind.as_str(),
        ));
    }
    out
}

/// Render a report's per-person summaries as CSV.
pub fn summary_csv(report: &AttendanceReport) -> String {
    let mut out = String::from(
        "person_id,display_name,entries,exits,dwell_hours,first_event,last_event,total_events\n",
    );
    for person in &report.people {
        out.push_str(&format!(
            "{},{},{},{},{:.2},{},{},{}\n",
            csv_field(&person.person_id),
            csv_field(&person.display_name),
            person.entries,
            person.exits,
            person.dwell_hours,
            person.first_event,
            person.last_event,
            person.total_events,
        ));
    }
    out
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(person: &str, kind: EventKind, day: u32, hour: u32, minute: u32) -> AttendanceEvent {
        AttendanceEvent {
            recorded_at: Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap(),
            person_id: person.to_string(),
            display_name: person.to_uppercase(),
            kind,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_two_sessions_sum_dwell() {
        // 9-12 and 13-17 make 7 hours.
        let events = vec![
            event("alice", EventKind::Entry, 10, 9, 0),
            event("alice", EventKind::Exit, 10, 12, 0),
            event("alice", EventKind::Entry, 10, 13, 0),
            event("alice", EventKind::Exit, 10, 17, 0),
        ];

        let report = summarize(&events, day(1), day(31));
        assert_eq!(report.people.len(), 1);
        let alice = &report.people[0];
        assert_eq!(alice.entries, 2);
        assert_eq!(alice.exits, 2);
        assert_eq!(alice.dwell_hours, 7.0);
        assert_eq!(report.total_dwell_hours, 7.0);
    }

    #[test]
    fn test_unterminated_entry_contributes_nothing() {
        let events = vec![event("alice", EventKind::Entry, 10, 9, 0)];
        let report = summarize(&events, day(1), day(31));
        let alice = &report.people[0];
        assert_eq!(alice.entries, 1);
        assert_eq!(alice.exits, 0);
        assert_eq!(alice.dwell_hours, 0.0);
    }

    #[test]
    fn test_orphan_exit_counts_but_never_pairs() {
        // A range starting mid-session sees EXIT first.
        let events = vec![
            event("alice", EventKind::Exit, 10, 8, 0),
            event("alice", EventKind::Entry, 10, 9, 0),
            event("alice", EventKind::Exit, 10, 11, 0),
        ];

        let report = summarize(&events, day(1), day(31));
        let alice = &report.people[0];
        assert_eq!(alice.entries, 1);
        assert_eq!(alice.exits, 2);
        assert_eq!(alice.dwell_hours, 2.0);
    }

    #[test]
    fn test_entry_takes_earliest_later_exit() {
        let events = vec![
            event("alice", EventKind::Entry, 10, 9, 0),
            event("alice", EventKind::Exit, 10, 12, 0),
            event("alice", EventKind::Exit, 10, 18, 0),
        ];

        let report = summarize(&events, day(1), day(31));
        assert_eq!(report.people[0].dwell_hours, 3.0);
    }

    #[test]
    fn test_date_filter_is_inclusive() {
        let events = vec![
            event("alice", EventKind::Entry, 9, 23, 0),
            event("alice", EventKind::Entry, 10, 9, 0),
            event("alice", EventKind::Exit, 10, 10, 0),
            event("alice", EventKind::Entry, 12, 9, 0),
            event("alice", EventKind::Exit, 12, 10, 0),
            event("alice", EventKind::Entry, 13, 9, 0),
        ];

        let report = summarize(&events, day(10), day(12));
        let alice = &report.people[0];
        assert_eq!(alice.total_events, 4);
        assert_eq!(alice.dwell_hours, 2.0);
        assert_eq!(alice.first_event, day(10));
        assert_eq!(alice.last_event, day(12));
    }

    #[test]
    fn test_people_are_sorted_and_independent() {
        let events = vec![
            event("zoe", EventKind::Entry, 10, 9, 0),
            event("alice", EventKind::Entry, 10, 9, 30),
            event("zoe", EventKind::Exit, 10, 10, 0),
        ];

        let report = summarize(&events, day(1), day(31));
        assert_eq!(report.people.len(), 2);
        assert_eq!(report.people[0].person_id, "alice");
        assert_eq!(report.people[1].person_id, "zoe");
        assert_eq!(report.people[0].dwell_hours, 0.0);
        assert_eq!(report.people[1].dwell_hours, 1.0);
        assert_eq!(report.active_people, 2);
        assert_eq!(report.total_entries, 2);
        assert_eq!(report.total_exits, 1);
        assert_eq!(report.mean_dwell_hours, 0.5);
    }

    #[test]
    fn test_dwell_rounds_to_two_decimals() {
        // 100 minutes is 1.666… hours, reported as 1.67.
        let events = vec![
            event("alice", EventKind::Entry, 10, 9, 0),
            event("alice", EventKind::Exit, 10, 10, 40),
        ];

        let report = summarize(&events, day(1), day(31));
        assert_eq!(report.people[0].dwell_hours, 1.67);
    }

    #[test]
    fn test_empty_range_produces_empty_report() {
        let events = vec![event("alice", EventKind::Entry, 10, 9, 0)];
        let report = summarize(&events, day(20), day(25));
        assert!(report.people.is_empty());
        assert_eq!(report.active_people, 0);
        assert_eq!(report.total_entries, 0);
        assert_eq!(report.total_dwell_hours, 0.0);
        assert_eq!(report.mean_dwell_hours, 0.0);
    }

    #[test]
    fn test_events_csv_layout() {
        let events = vec![event("alice", EventKind::Entry, 10, 9, 0)];
        let csv = events_csv(&events);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("recorded_at,person_id,display_name,type"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("2025-03-10T09:00:00"));
        assert!(row.ends_with(",alice,ALICE,ENTRY"));
    }

    #[test]
    fn test_csv_quotes_awkward_fields() {
        let mut e = event("alice", EventKind::Entry, 10, 9, 0);
        e.display_name = "Doe, Jane \"JD\"".to_string();
        let csv = events_csv(&[e]);
        assert!(csv.contains("\"Doe, Jane \"\"JD\"\"\""));
    }

    #[test]
    fn test_summary_csv_layout() {
        let events = vec![
            event("alice", EventKind::Entry, 10, 9, 0),
            event("alice", EventKind::Exit, 10, 12, 0),
        ];
        let report = summarize(&events, day(1), day(31));
        let csv = summary_csv(&report);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("person_id,display_name,entries,exits,dwell_hours,first_event,last_event,total_events")
        );
        assert_eq!(lines.next(), Some("alice,ALICE,1,1,3.00,2025-03-10,2025-03-10,2"));
    }
}
