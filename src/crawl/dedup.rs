//! Near-duplicate registry
//!
//! Fingerprints are grouped by normalized URL. A new page is compared with
//! every fingerprint already recorded under its normalized URL; a Jaccard
//! similarity above the threshold counts as a near-duplicate hit. Hits are
//! counted per normalized URL, and once the count passes the allowed maximum
//! the caller is told to trap that URL.

use std::collections::HashMap;

use super::fingerprint::Fingerprint;
use crate::config::DedupConfig;

/// Result of checking a page against the registry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DuplicateCheck {
    /// No recorded fingerprint is similar enough
    Unique,
    /// A recorded fingerprint exceeded the similarity threshold
    NearDuplicate {
        /// Similarity of the first matching fingerprint
        similarity: f64,
        /// Near-duplicate hits recorded for this normalized URL so far
        hits: u32,
        /// The hit count has passed the allowed maximum
        exceeds_limit: bool,
    },
}

impl DuplicateCheck {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateCheck::NearDuplicate { .. })
    }
}

/// Fingerprint history and near-duplicate counters per normalized URL
#[derive(Debug, Clone)]
pub struct NearDuplicateRegistry {
    /// Fingerprints in the order they were recorded
    fingerprints: HashMap<String, Vec<Fingerprint>>,
    /// Near-duplicate hits per normalized URL
    near_dupes: HashMap<String, u32>,
    similarity_threshold: f64,
    max_dupes_allowed: u32,
}

impl NearDuplicateRegistry {
    pub fn new(similarity_threshold: f64, max_dupes_allowed: u32) -> Self {
        Self {
            fingerprints: HashMap::new(),
            near_dupes: HashMap::new(),
            similarity_threshold,
            max_dupes_allowed,
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.similarity_threshold, config.max_dupes_allowed)
    }

    /// Compare `fingerprint` with the history of `normalized`, then record it.
    ///
    /// The fingerprint is appended whether or not it matched.
    pub fn check_and_register(&mut self, normalized: &str, fingerprint: Fingerprint) -> DuplicateCheck {
        let threshold = self.similarity_threshold;
        let history = self.fingerprints.entry(normalized.to_string()).or_default();

        let matched = history
            .iter()
            .map(|saved| fingerprint.similarity(saved))
            .find(|similarity| *similarity > threshold);

        history.push(fingerprint);

        match matched {
            Some(similarity) => {
                let hits = self.near_dupes.entry(normalized.to_string()).or_insert(0);
                *hits += 1;
                DuplicateCheck::NearDuplicate {
                    similarity,
                    hits: *hits,
                    exceeds_limit: *hits > self.max_dupes_allowed,
                }
            }
            None => DuplicateCheck::Unique,
        }
    }

    /// Fingerprints recorded under `normalized`
    pub fn history(&self, normalized: &str) -> &[Fingerprint] {
        self.fingerprints
            .get(normalized)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Near-duplicate hits recorded for `normalized`
    pub fn hits(&self, normalized: &str) -> u32 {
        self.near_dupes.get(normalized).copied().unwrap_or(0)
    }

    /// Total near-duplicate hits across all normalized URLs
    pub fn total_hits(&self) -> u64 {
        self.near_dupes.values().map(|&n| n as u64).sum()
    }

    /// Number of normalized URLs with recorded fingerprints
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn fingerprints(&self) -> &HashMap<String, Vec<Fingerprint>> {
        &self.fingerprints
    }

    pub fn near_duplicate_counts(&self) -> &HashMap<String, u32> {
        &self.near_dupes
    }

    /// Replace the recorded history and counters, e.g. from a snapshot
    pub fn restore(
        &mut self,
        fingerprints: HashMap<String, Vec<Fingerprint>>,
        near_dupes: HashMap<String, u32>,
    ) {
        self.fingerprints = fingerprints;
        self.near_dupes = near_dupes;
    }
}
