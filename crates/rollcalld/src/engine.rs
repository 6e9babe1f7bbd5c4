//! Recognition engine: the single writer for the registry and the ledger.
//!
//! All state-changing work funnels through one OS thread that owns the
//! store, the template registry, and the cooldown tracker. D-Bus handlers
//! talk to it through a channel, so concurrent callers serialize and the
//! ledger's append order is total.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rollcall_core::registry::{primary_descriptor, SkippedEnrollment};
use rollcall_core::{
    AttendanceEvent, CenterSquareLocator, CooldownTracker, CosineMatcher, EventKind,
    HistogramExtractor, Matcher, RebuildReport, Registry, RegistryError,
};
use rollcall_store::{PersonRow, Store, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use rollcall_core::report::{self, AttendanceReport};

/// Similarity reported for simulated sightings, which skip matching.
const SIMULATED_SCORE: f32 = 1.0;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("enrollment image unusable: {0}")]
    UnusableEnrollmentImage(String),
    #[error("enrollment limit reached ({0} people)")]
    EnrollmentLimitReached(usize),
    #[error("no such person: {0}")]
    UnknownPerson(String),
    #[error("no people enrolled")]
    NoneEnrolled,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Outcome of processing one detected face.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SightingOutcome {
    /// The image yielded no descriptor; nothing was matched or recorded.
    Unprocessed { reason: String },
    /// No enrolled template scored strictly above the threshold.
    Unknown { score: f32 },
    /// A match inside the person's cooldown window; nothing was recorded.
    Suppressed { person_id: String },
    /// A match that appended a ledger event.
    Recorded {
        person_id: String,
        display_name: String,
        kind: EventKind,
        score: f32,
    },
}

/// Result of a successful enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollOutcome {
    pub person_id: String,
    pub display_name: String,
    pub enrollment_id: String,
    /// Registry size after the post-enrollment rebuild.
    pub enrolled: usize,
    /// Rows that rebuild skipped; only possible for stored enrollments
    /// predating this daemon's image validation.
    pub skipped: Vec<SkippedEnrollment>,
}

/// Daemon status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub version: String,
    pub db_path: String,
    pub enrolled: usize,
    pub ledger_events: u64,
    pub recognition_threshold: f32,
    pub cooldown_secs: u64,
    /// People with a recorded sighting since the daemon started.
    pub tracked_people: usize,
    pub max_enrolled: usize,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Sighting {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<SightingOutcome, EngineError>>,
    },
    Simulate {
        person_id: Option<String>,
        reply: oneshot::Sender<Result<SightingOutcome, EngineError>>,
    },
    Enroll {
        person_id: String,
        display_name: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<EnrollOutcome, EngineError>>,
    },
    Remove {
        person_id: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Rebuild {
        reply: oneshot::Sender<Result<RebuildReport, EngineError>>,
    },
    People {
        reply: oneshot::Sender<Result<Vec<PersonRow>, EngineError>>,
    },
    Report {
        start: NaiveDate,
        end: NaiveDate,
        reply: oneshot::Sender<Result<AttendanceReport, EngineError>>,
    },
    ExportLedger {
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<Result<EngineStatus, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run the recognition pipeline on one detected face image.
    pub async fn process_sighting(&self, image: Vec<u8>) -> Result<SightingOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Sighting { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Record a sighting for a named (or random) enrolled person, skipping
    /// extraction and matching.
    pub async fn simulate(&self, person_id: Option<String>) -> Result<SightingOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Simulate { person_id, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Enroll (or re-enroll) a person from a face photo.
    pub async fn enroll(
        &self,
        person_id: String,
        display_name: String,
        image: Vec<u8>,
    ) -> Result<EnrollOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll { person_id, display_name, image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Remove a person's enrollment; their ledger history is kept.
    pub async fn remove(&self, person_id: String) -> Result<bool, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Remove { person_id, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Rebuild the template registry from the enrollment store.
    pub async fn rebuild(&self) -> Result<RebuildReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Rebuild { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// List enrolled people.
    pub async fn people(&self) -> Result<Vec<PersonRow>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::People { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Summarize attendance over an inclusive date range.
    pub async fn report(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AttendanceReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Report { start, end, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Dump the full ledger as CSV.
    pub async fn export_ledger(&self) -> Result<String, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::ExportLedger { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Daemon status snapshot.
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the store and performs the initial registry rebuild synchronously
/// (fail-fast), then enters the request loop. The thread is the only code
/// touching the store, so ledger appends serialize by construction.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let mut store = Store::open(&config.db_path)?;
    let registry = Registry::new();
    let locator = CenterSquareLocator;
    let extractor = HistogramExtractor;

    let initial = registry.rebuild(&store.enrollments()?, &locator, &extractor)?;
    tracing::info!(
        db = %config.db_path.display(),
        loaded = initial.loaded,
        skipped = initial.skipped.len(),
        "initial registry rebuild"
    );

    let mut cooldown = CooldownTracker::new(Duration::seconds(config.cooldown_secs as i64));
    let threshold = config.recognition_threshold;
    let max_enrolled = config.max_enrolled;
    let cooldown_secs = config.cooldown_secs;
    let db_path = config.db_path.display().to_string();

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Sighting { image, reply } => {
                        let result = run_sighting(
                            &image,
                            Utc::now(),
                            threshold,
                            &registry,
                            &locator,
                            &extractor,
                            &mut cooldown,
                            &mut store,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Simulate { person_id, reply } => {
                        let result = run_simulate(
                            person_id.as_deref(),
                            Utc::now(),
                            &registry,
                            &mut cooldown,
                            &mut store,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Enroll { person_id, display_name, image, reply } => {
                        let result = run_enroll(
                            &person_id,
                            &display_name,
                            &image,
                            Utc::now(),
                            max_enrolled,
                            &registry,
                            &locator,
                            &extractor,
                            &mut store,
                        );
                        let _ = reply.send(result);
                    }
                    EngineRequest::Remove { person_id, reply } => {
                        let result = run_remove(&person_id, &registry, &locator, &extractor, &store);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Rebuild { reply } => {
                        let result = run_rebuild(&registry, &locator, &extractor, &store);
                        let _ = reply.send(result);
                    }
                    EngineRequest::People { reply } => {
                        let _ = reply.send(store.people().map_err(EngineError::from));
                    }
                    EngineRequest::Report { start, end, reply } => {
                        let result = store
                            .read_all()
                            .map(|events| report::summarize(&events, start, end))
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ExportLedger { reply } => {
                        let result = store
                            .read_all()
                            .map(|events| report::events_csv(&events))
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Status { reply } => {
                        let result = run_status(
                            &db_path,
                            threshold,
                            cooldown_secs,
                            max_enrolled,
                            &registry,
                            &cooldown,
                            &store,
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

/// Locate the primary face region, extract and match its descriptor, then
/// hand any confirmed identity to [`record_match`].
fn run_sighting(
    image: &[u8],
    now: DateTime<Utc>,
    threshold: f32,
    registry: &Registry,
    locator: &CenterSquareLocator,
    extractor: &HistogramExtractor,
    cooldown: &mut CooldownTracker,
    store: &mut Store,
) -> Result<SightingOutcome, EngineError> {
    // Same region and extraction path as registry rebuild, so sighting
    // descriptors stay comparable with enrolled templates.
    let descriptor = match primary_descriptor(image, locator, extractor) {
        Ok(d) => d,
        Err(err) => {
            tracing::debug!(error = %err, "sighting yielded no descriptor");
            return Ok(SightingOutcome::Unprocessed { reason: err.to_string() });
        }
    };

    let templates = registry.snapshot();
    let matcher = CosineMatcher;
    let result = matcher.compare(&descriptor, &templates, threshold);

    if !result.matched {
        tracing::debug!(score = result.score, "no template above threshold");
        return Ok(SightingOutcome::Unknown { score: result.score });
    }
    let (Some(person_id), Some(display_name)) = (result.person_id, result.display_name) else {
        // compare never reports a match without identity fields
        return Ok(SightingOutcome::Unknown { score: result.score });
    };

    record_match(person_id, display_name, result.score, now, cooldown, store)
}

/// Record a sighting for an enrolled person without extraction or matching.
/// Walks the same cooldown and alternation path as a real sighting.
fn run_simulate(
    person_id: Option<&str>,
    now: DateTime<Utc>,
    registry: &Registry,
    cooldown: &mut CooldownTracker,
    store: &mut Store,
) -> Result<SightingOutcome, EngineError> {
    let templates = registry.snapshot();
    let template = match person_id {
        Some(id) => templates
            .iter()
            .find(|t| t.person_id == id)
            .ok_or_else(|| EngineError::UnknownPerson(id.to_string()))?,
        None => templates
            .choose(&mut rand::thread_rng())
            .ok_or(EngineError::NoneEnrolled)?,
    };

    record_match(
        template.person_id.clone(),
        template.display_name.clone(),
        SIMULATED_SCORE,
        now,
        cooldown,
        store,
    )
}

/// Cooldown gate, ENTRY/EXIT derivation and ledger append for a confirmed
/// identity.
///
/// The cooldown is marked strictly after the append succeeded; a failed
/// write never opens a window, so the next sighting retries the append.
fn record_match(
    person_id: String,
    display_name: String,
    score: f32,
    now: DateTime<Utc>,
    cooldown: &mut CooldownTracker,
    store: &mut Store,
) -> Result<SightingOutcome, EngineError> {
    if cooldown.should_suppress(&person_id, now) {
        tracing::debug!(person_id = %person_id, "sighting inside cooldown window");
        return Ok(SightingOutcome::Suppressed { person_id });
    }

    let kind = store.determine_next_kind(&person_id)?;
    let event = AttendanceEvent {
        recorded_at: now,
        person_id: person_id.clone(),
        display_name: display_name.clone(),
        kind,
    };
    store.append(&event)?;
    cooldown.record_seen(&person_id, now);

    tracing::info!(person_id = %person_id, kind = %kind, score, "attendance recorded");

    Ok(SightingOutcome::Recorded { person_id, display_name, kind, score })
}

/// Validate, store and activate an enrollment.
fn run_enroll(
    person_id: &str,
    display_name: &str,
    image: &[u8],
    now: DateTime<Utc>,
    max_enrolled: usize,
    registry: &Registry,
    locator: &CenterSquareLocator,
    extractor: &HistogramExtractor,
    store: &mut Store,
) -> Result<EnrollOutcome, EngineError> {
    // Reject unusable images before anything reaches the store; a person
    // must never be enrolled without a working template.
    if let Err(err) = primary_descriptor(image, locator, extractor) {
        return Err(EngineError::UnusableEnrollmentImage(err.to_string()));
    }

    let replacing = store.people()?.iter().any(|p| p.person_id == person_id);
    if max_enrolled > 0 && !replacing && store.person_count()? >= max_enrolled {
        return Err(EngineError::EnrollmentLimitReached(max_enrolled));
    }

    let enrollment_id = store.enroll(person_id, display_name, image, now)?;
    let rebuilt = registry.rebuild(&store.enrollments()?, locator, extractor)?;

    tracing::info!(person_id, enrolled = rebuilt.loaded, "enrollment active");

    Ok(EnrollOutcome {
        person_id: person_id.to_string(),
        display_name: display_name.to_string(),
        enrollment_id,
        enrolled: rebuilt.loaded,
        skipped: rebuilt.skipped,
    })
}

fn run_remove(
    person_id: &str,
    registry: &Registry,
    locator: &CenterSquareLocator,
    extractor: &HistogramExtractor,
    store: &Store,
) -> Result<bool, EngineError> {
    let removed = store.remove_person(person_id)?;
    if removed {
        registry.rebuild(&store.enrollments()?, locator, extractor)?;
    }
    Ok(removed)
}

fn run_rebuild(
    registry: &Registry,
    locator: &CenterSquareLocator,
    extractor: &HistogramExtractor,
    store: &Store,
) -> Result<RebuildReport, EngineError> {
    Ok(registry.rebuild(&store.enrollments()?, locator, extractor)?)
}

fn run_status(
    db_path: &str,
    threshold: f32,
    cooldown_secs: u64,
    max_enrolled: usize,
    registry: &Registry,
    cooldown: &CooldownTracker,
    store: &Store,
) -> Result<EngineStatus, EngineError> {
    Ok(EngineStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        db_path: db_path.to_string(),
        enrolled: registry.len(),
        ledger_events: store.event_count()?,
        recognition_threshold: threshold,
        cooldown_secs,
        tracked_people: cooldown.len(),
        max_enrolled,
    })
}
