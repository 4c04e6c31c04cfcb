//! Fuzzy duplicate detection over existing client records.
//!
//! Before a plan that creates or renames a client is surfaced for approval,
//! the proposed name is compared against the owner's existing clients. Names
//! are normalized, checked for containment, and otherwise scored with
//! Jaro-Winkler. Matches are bucketed into three similarity bands by the
//! configured thresholds.

use serde_json::Value as Json;
use strsim::jaro_winkler;
use tracing::debug;

use dealflow_core::config::EngineConfig;
use dealflow_core::types::JsonMap;

use crate::error::DetectError;
use crate::store::DataStore;
use crate::types::{DuplicateCandidate, Similarity};

/// Scores proposed client names against existing records.
pub struct DuplicateDetector {
    low: f64,
    medium: f64,
    high: f64,
}

impl DuplicateDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            low: config.duplicate_low_threshold,
            medium: config.duplicate_medium_threshold,
            high: config.duplicate_high_threshold,
        }
    }

    /// Find existing clients similar to the names proposed in `entities`.
    ///
    /// Looks at `client_name` and `brand_name`; a record matches if either
    /// of its own name fields scores against either proposed name. Results
    /// are sorted best-first and contain each record at most once.
    pub async fn find_candidates(
        &self,
        store: &dyn DataStore,
        user_id: &str,
        entities: &JsonMap,
    ) -> Result<Vec<DuplicateCandidate>, DetectError> {
        let proposed: Vec<String> = ["client_name", "brand_name"]
            .iter()
            .filter_map(|key| entities.get(*key).and_then(Json::as_str))
            .map(normalize)
            .filter(|name| !name.is_empty())
            .collect();
        if proposed.is_empty() {
            return Ok(Vec::new());
        }

        let rows = store
            .select(user_id, "clients", &JsonMap::new())
            .await
            .map_err(DetectError::Storage)?;

        let mut candidates: Vec<(f64, DuplicateCandidate)> = Vec::new();
        for row in &rows {
            let record_id = match row.get("id").and_then(Json::as_str) {
                Some(id) => id.to_string(),
                None => continue,
            };
            let display_name = row
                .get("client_name")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string();

            let existing: Vec<String> = ["client_name", "brand_name"]
                .iter()
                .filter_map(|key| row.get(*key).and_then(Json::as_str))
                .map(normalize)
                .filter(|name| !name.is_empty())
                .collect();

            let mut best = 0.0_f64;
            for p in &proposed {
                for e in &existing {
                    best = best.max(score(p, e));
                }
            }

            let similarity = if best >= self.high {
                Similarity::High
            } else if best >= self.medium {
                Similarity::Medium
            } else if best >= self.low {
                Similarity::Low
            } else {
                continue;
            };

            debug!(record_id = %record_id, score = best, ?similarity, "Duplicate candidate");
            candidates.push((
                best,
                DuplicateCandidate {
                    record_id,
                    name: display_name,
                    similarity,
                },
            ));
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.name.cmp(&b.1.name))
        });
        Ok(candidates.into_iter().map(|(_, c)| c).collect())
    }
}

/// Lowercase, strip everything but alphanumerics, collapse runs of
/// separators into single spaces.
fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_space = true;
        }
    }
    out
}

/// Containment of one normalized name in the other is treated as an exact
/// match; otherwise score with Jaro-Winkler.
fn score(a: &str, b: &str) -> f64 {
    if a.contains(b) || b.contains(a) {
        return 1.0;
    }
    jaro_winkler(a, b)
}
