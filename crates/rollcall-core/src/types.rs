use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed-length numeric descriptor of a face region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    /// Compute cosine similarity between two descriptors.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. For the
    /// non-negative histogram descriptors produced here the range
    /// collapses to [0, 1].
    pub fn similarity(&self, other: &Descriptor) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An enrolled face template with identity metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Enrollment record id (fresh for every enrollment).
    pub id: String,
    /// Stable person identifier the attendance ledger keys on.
    pub person_id: String,
    pub display_name: String,
    pub descriptor: Descriptor,
    pub enrolled_at: DateTime<Utc>,
}

/// Result of matching a probe descriptor against the enrolled templates.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best candidate; 0.0 for an empty registry.
    pub score: f32,
    /// Person id of the matched template (if any).
    pub person_id: Option<String>,
    /// Display name of the matched template (if any).
    pub display_name: Option<String>,
}

impl MatchResult {
    fn none(score: f32) -> Self {
        MatchResult { matched: false, score, person_id: None, display_name: None }
    }
}

/// Strategy for comparing a probe descriptor against enrolled templates.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, templates: &[Template], threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher over the whole template set.
///
/// A candidate matches only when its score strictly exceeds the threshold;
/// a score exactly equal to the threshold is not a match. Ties on the best
/// score keep the earliest template in registry order.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Descriptor, templates: &[Template], threshold: f32) -> MatchResult {
        // An empty registry can never match; skip scoring entirely.
        if templates.is_empty() {
            return MatchResult::none(0.0);
        }

        let mut best_score = f32::NEG_INFINITY;
        let mut best_idx = 0usize;

        for (i, template) in templates.iter().enumerate() {
            let score = probe.similarity(&template.descriptor);
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }

        if best_score > threshold {
            let best = &templates[best_idx];
            MatchResult {
                matched: true,
                score: best_score,
                person_id: Some(best.person_id.clone()),
                display_name: Some(best.display_name.clone()),
            }
        } else {
            MatchResult::none(best_score)
        }
    }
}
