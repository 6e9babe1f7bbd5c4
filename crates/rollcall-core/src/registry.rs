//! Enrolled template registry.
//!
//! Holds the in-memory template set the matcher runs against. The set is
//! never edited in place: `rebuild` derives a fresh set from the persisted
//! enrollments and installs it with a single swap, so readers always see
//! either the old set or the new one, complete.

use crate::descriptor::{DescriptorExtractor, ExtractError};
use crate::locate::{crop_region, FaceLocator};
use crate::types::{Descriptor, Template};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// One persisted enrollment, as handed over by the enrollment store.
#[derive(Debug, Clone)]
pub struct EnrollmentRecord {
    pub enrollment_id: String,
    pub person_id: String,
    pub display_name: String,
    pub enrolled_at: DateTime<Utc>,
    /// Encoded face photo (any format the `image` crate can decode).
    pub image: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(
        "descriptor length mismatch for '{person_id}': expected {expected}, got {actual}"
    )]
    DescriptorLengthMismatch {
        person_id: String,
        expected: usize,
        actual: usize,
    },
}

/// An enrollment passed over during a rebuild because its image produced
/// no descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEnrollment {
    pub person_id: String,
    pub reason: String,
}

/// Outcome of a registry rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    /// Templates installed by this rebuild.
    pub loaded: usize,
    pub skipped: Vec<SkippedEnrollment>,
}

/// In-memory set of enrolled templates.
///
/// Readers take cheap `Arc` snapshots and keep matching against them while
/// a rebuild is in flight; a partially built set is never observable.
#[derive(Debug, Default)]
pub struct Registry {
    templates: RwLock<Arc<Vec<Template>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current template set, in the insertion order of the last rebuild.
    pub fn snapshot(&self) -> Arc<Vec<Template>> {
        match self.templates.read() {
            Ok(guard) => Arc::clone(&guard),
            // A writer only ever replaces the Arc wholesale, so a poisoned
            // lock still holds a complete set.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Number of enrolled templates.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Rebuild the template set from persisted enrollments.
    ///
    /// Records are processed in scan order, extracting a descriptor from
    /// the primary located face region of each image. Records whose image
    /// yields no descriptor are skipped with a warning rather than failing
    /// the rebuild. A duplicate person id keeps the later record's template
    /// in the earlier record's position. The new set replaces the old one
    /// atomically once fully built.
    pub fn rebuild(
        &self,
        records: &[EnrollmentRecord],
        locator: &dyn FaceLocator,
        extractor: &dyn DescriptorExtractor,
    ) -> Result<RebuildReport, RegistryError> {
        let mut templates: Vec<Template> = Vec::with_capacity(records.len());
        let mut index_by_person: HashMap<String, usize> = HashMap::new();
        let mut skipped = Vec::new();
        let mut expected_len: Option<usize> = None;

        for record in records {
            let descriptor = match primary_descriptor(&record.image, locator, extractor) {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!(
                        person_id = %record.person_id,
                        error = %err,
                        "skipping enrollment with no usable descriptor"
                    );
                    skipped.push(SkippedEnrollment {
                        person_id: record.person_id.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            match expected_len {
                None => expected_len = Some(descriptor.len()),
                Some(expected) if expected != descriptor.len() => {
                    return Err(RegistryError::DescriptorLengthMismatch {
                        person_id: record.person_id.clone(),
                        expected,
                        actual: descriptor.len(),
                    });
                }
                Some(_) => {}
            }

            let template = Template {
                id: record.enrollment_id.clone(),
                person_id: record.person_id.clone(),
                display_name: record.display_name.clone(),
                descriptor,
                enrolled_at: record.enrolled_at,
            };

            match index_by_person.get(&record.person_id) {
                Some(&i) => templates[i] = template,
                None => {
                    index_by_person.insert(record.person_id.clone(), templates.len());
                    templates.push(template);
                }
            }
        }

        let loaded = templates.len();
        self.install(Arc::new(templates));
        tracing::info!(loaded, skipped = skipped.len(), "registry rebuilt");

        Ok(RebuildReport { loaded, skipped })
    }

    fn install(&self, set: Arc<Vec<Template>>) {
        match self.templates.write() {
            Ok(mut guard) => *guard = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
    }
}

/// Extract the descriptor for an image's primary (first located) face region.
///
/// Shared by registry rebuilds and by enrollment validation, so an image is
/// accepted at enrollment exactly when a later rebuild can template it.
pub fn primary_descriptor(
    image: &[u8],
    locator: &dyn FaceLocator,
    extractor: &dyn DescriptorExtractor,
) -> Result<Descriptor, ExtractError> {
    if image.is_empty() {
        return Err(ExtractError::EmptyRegion);
    }
    let gray = image::load_from_memory(image)?.to_luma8();
    let regions = locator.locate(&gray);
    let Some(primary) = regions.first() else {
        return Err(ExtractError::EmptyRegion);
    };
    let face = crop_region(&gray, primary);
    extractor.extract(&face)
}
