//! rollcall-core: face descriptor matching and attendance semantics.
//!
//! Pure domain logic for the attendance engine: histogram descriptors,
//! the enrolled-template registry, cosine matching, the recognition
//! cooldown, ENTRY/EXIT alternation and dwell-time reporting. Persistence
//! and IPC live in the sibling crates.

pub mod cooldown;
pub mod descriptor;
pub mod event;
pub mod locate;
pub mod registry;
pub mod report;
pub mod types;

pub use cooldown::CooldownTracker;
pub use descriptor::{DescriptorExtractor, ExtractError, HistogramExtractor, DESCRIPTOR_LEN};
pub use event::{next_kind, AttendanceEvent, EventKind, ParseKindError};
pub use locate::{CenterSquareLocator, FaceLocator, FaceRegion};
pub use registry::{EnrollmentRecord, RebuildReport, Registry, RegistryError};
pub use report::{summarize, AttendanceReport, PersonSummary};
pub use types::{CosineMatcher, Descriptor, MatchResult, Matcher, Template};
