use chrono::NaiveDate;
use serde::Serialize;
use zbus::interface;

use crate::engine::EngineHandle;
use rollcall_core::report::summary_csv;

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.freedesktop.Rollcall1
/// Object path: /org/freedesktop/Rollcall1
///
/// Structured results are returned as JSON strings; callers that want
/// spreadsheets use the `*_csv` and export methods instead.
pub struct RollcallService {
    pub engine: EngineHandle,
}

#[interface(name = "org.freedesktop.Rollcall1")]
impl RollcallService {
    /// Run the recognition pipeline on one detected face image.
    async fn process_sighting(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        let outcome = self.engine.process_sighting(image).await.map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Record a sighting for an enrolled person without a camera image.
    /// An empty `person_id` picks an enrolled person at random.
    async fn simulate_sighting(&self, person_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(person_id, "simulated sighting requested");
        let person = if person_id.is_empty() {
            None
        } else {
            Some(person_id.to_string())
        };
        let outcome = self.engine.simulate(person).await.map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Enroll (or re-enroll) a person from a face photo.
    async fn enroll(
        &self,
        person_id: &str,
        display_name: &str,
        image: Vec<u8>,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(person_id, display_name, "enroll requested");
        let outcome = self
            .engine
            .enroll(person_id.to_string(), display_name.to_string(), image)
            .await
            .map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Remove a person's enrollment. Their attendance history is kept.
    async fn remove(&self, person_id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(person_id, "removal requested");
        self.engine.remove(person_id.to_string()).await.map_err(to_fdo)
    }

    /// Rebuild the template registry from the enrollment store.
    async fn rebuild(&self) -> zbus::fdo::Result<String> {
        tracing::info!("registry rebuild requested");
        let report = self.engine.rebuild().await.map_err(to_fdo)?;
        to_json(&report)
    }

    /// List enrolled people.
    async fn list_people(&self) -> zbus::fdo::Result<String> {
        let people = self.engine.people().await.map_err(to_fdo)?;
        to_json(&people)
    }

    /// Attendance report over an inclusive date range (`YYYY-MM-DD`).
    async fn report(&self, start: &str, end: &str) -> zbus::fdo::Result<String> {
        let (start, end) = parse_range(start, end)?;
        let report = self.engine.report(start, end).await.map_err(to_fdo)?;
        to_json(&report)
    }

    /// Same range as `report`, as a per-person CSV summary.
    async fn report_csv(&self, start: &str, end: &str) -> zbus::fdo::Result<String> {
        let (start, end) = parse_range(start, end)?;
        let report = self.engine.report(start, end).await.map_err(to_fdo)?;
        Ok(summary_csv(&report))
    }

    /// Dump the full attendance ledger as CSV, oldest event first.
    async fn export_ledger(&self) -> zbus::fdo::Result<String> {
        self.engine.export_ledger().await.map_err(to_fdo)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        to_json(&status)
    }
}

fn to_fdo(err: crate::engine::EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|err| zbus::fdo::Error::Failed(err.to_string()))
}

fn parse_range(start: &str, end: &str) -> zbus::fdo::Result<(NaiveDate, NaiveDate)> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    if start > end {
        return Err(zbus::fdo::Error::InvalidArgs(format!(
            "range start {start} is after end {end}"
        )));
    }
    Ok((start, end))
}

fn parse_date(value: &str) -> zbus::fdo::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        zbus::fdo::Error::InvalidArgs(format!("invalid date {value:?} (expected YYYY-MM-DD)"))
    })
}
