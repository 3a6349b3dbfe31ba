//! URL Frontier
//!
//! FIFO work queue gated by the set of raw URLs ever admitted. The frontier
//! also owns the near-duplicate registry and the trap detector, so every
//! read-modify-write on crawl state goes through one `&mut Frontier`. Callers
//! sharing it between workers wrap it in a single mutex.
//!
//! Query and fragment variants of one page are distinct raw URLs and are all
//! queued; content-level dedup is the registry's job.
//!
//! A dequeued URL stays in flight until [`Frontier::complete`] is called for
//! it. Snapshots put in-flight URLs back at the head of the queue and leave
//! them out of the fetched count, so a resumed crawl fetches them again.

use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, info, warn};

use super::dedup::{DuplicateCheck, NearDuplicateRegistry};
use super::fingerprint::{Fingerprint, Fingerprinter};
use super::normalize_url;
use super::snapshot::{FrontierSnapshot, SnapshotError, TrapState};
use super::trap_detection::{Admission, Rejection, TrapDetector};
use crate::config::{Config, DedupConfig, TrapConfig};
use crate::util::truncate_str;

/// What happened to a candidate link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Appended to the queue
    Queued,
    /// Passed the trap detector but was admitted before
    AlreadySeen,
    /// Refused by the trap detector
    Rejected(Rejection),
}

/// Frontier counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrontierStats {
    pub queue_len: usize,
    pub seen_count: usize,
    pub fetched: u64,
    pub trap_count: usize,
    pub near_duplicate_total: u64,
}

/// Crawl work queue plus all admission and dedup state
#[derive(Debug, Clone)]
pub struct Frontier {
    queue: VecDeque<String>,
    /// Raw URLs ever admitted; never shrinks
    seen: HashSet<String>,
    /// Dequeued but not yet completed, in dequeue order
    in_flight: Vec<String>,
    fetched: u64,
    fingerprinter: Fingerprinter,
    registry: NearDuplicateRegistry,
    traps: TrapDetector,
}

impl Frontier {
    pub fn new(traps: &TrapConfig, dedup: &DedupConfig, allowed_domain_suffix: &str) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            in_flight: Vec::new(),
            fetched: 0,
            fingerprinter: Fingerprinter::from_config(dedup),
            registry: NearDuplicateRegistry::from_config(dedup),
            traps: TrapDetector::new(traps.clone(), allowed_domain_suffix),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.traps, &config.dedup, &config.crawl.allowed_domain_suffix)
    }

    /// Enqueue `url` unless it was ever admitted before
    pub fn add(&mut self, url: &str) -> bool {
        if !self.seen.insert(url.to_string()) {
            return false;
        }
        self.queue.push_back(url.to_string());
        true
    }

    /// Pop the head of the queue, counting it as fetched and marking it in flight
    pub fn next(&mut self) -> Option<String> {
        let url = self.queue.pop_front()?;
        self.fetched += 1;
        self.in_flight.push(url.clone());
        Some(url)
    }

    /// Mark a dequeued URL as fully processed; false if it wasn't in flight
    pub fn complete(&mut self, url: &str) -> bool {
        match self.in_flight.iter().position(|u| u == url) {
            Some(pos) => {
                self.in_flight.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of dequeued URLs not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn has_next(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    pub fn registry(&self) -> &NearDuplicateRegistry {
        &self.registry
    }

    pub fn traps(&self) -> &BTreeSet<String> {
        self.traps.traps()
    }

    /// Record `fingerprint` under the normalized form of `url` and compare it
    /// with the pages already seen there.
    ///
    /// Once the near-duplicate count for that normalized URL passes the
    /// allowed maximum, the normalized URL is trapped in the same call.
    pub fn check_near_duplicate(&mut self, url: &str, fingerprint: Fingerprint) -> DuplicateCheck {
        let normalized = normalize_url(url).unwrap_or_else(|_| url.to_string());
        let check = self.registry.check_and_register(&normalized, fingerprint);

        if let DuplicateCheck::NearDuplicate {
            similarity,
            hits,
            exceeds_limit,
        } = check
        {
            debug!(
                "Near-duplicate {} (similarity {:.3}, hit {})",
                truncate_str(url, 120),
                similarity,
                hits
            );
            if exceeds_limit {
                self.traps.register_trap(&normalized, "near-duplicate limit");
            }
        }

        check
    }

    pub fn is_near_duplicate(&mut self, url: &str, fingerprint: Fingerprint) -> bool {
        self.check_near_duplicate(url, fingerprint).is_duplicate()
    }

    /// Run a discovered link through the trap detector, then the seen set
    pub fn admit(&mut self, url: &str) -> LinkOutcome {
        match self.traps.inspect(url) {
            Admission::Rejected(reason) => LinkOutcome::Rejected(reason),
            Admission::Admitted if self.add(url) => LinkOutcome::Queued,
            Admission::Admitted => LinkOutcome::AlreadySeen,
        }
    }

    pub fn stats(&self) -> FrontierStats {
        FrontierStats {
            queue_len: self.queue.len(),
            seen_count: self.seen.len(),
            fetched: self.fetched,
            trap_count: self.traps.traps().len(),
            near_duplicate_total: self.registry.total_hits(),
        }
    }

    /// Copy all persistent state, returning in-flight URLs to the queue head
    pub fn snapshot(&self) -> FrontierSnapshot {
        let queue = self
            .in_flight
            .iter()
            .chain(self.queue.iter())
            .cloned()
            .collect();

        FrontierSnapshot {
            queue,
            seen: self.seen.clone(),
            fetched: self.fetched - self.in_flight.len() as u64,
            fingerprints: self.registry.fingerprints().clone(),
            trap_state: TrapState {
                traps: self.traps.traps().clone(),
                near_duplicates: self.registry.near_duplicate_counts().clone(),
                domain_visits: self.traps.domain_visits().clone(),
            },
        }
    }

    /// Replace all persistent state with `snapshot`, keeping configuration
    pub fn apply_snapshot(&mut self, snapshot: FrontierSnapshot) {
        let FrontierSnapshot {
            queue,
            seen,
            fetched,
            fingerprints,
            trap_state,
        } = snapshot;

        self.queue = queue;
        self.seen = seen;
        self.in_flight.clear();
        self.fetched = fetched;
        self.registry.restore(fingerprints, trap_state.near_duplicates);
        self.traps.restore(trap_state.traps, trap_state.domain_visits);
    }

    /// Persist the frontier into `dir`
    pub fn checkpoint(&self, dir: &Path) -> Result<u64, SnapshotError> {
        self.snapshot().save(dir)
    }

    /// Load the frontier from `dir`; on error the frontier is left unchanged
    pub fn restore(&mut self, dir: &Path) -> Result<(), SnapshotError> {
        let snapshot = FrontierSnapshot::load(dir)?;
        self.apply_snapshot(snapshot);
        Ok(())
    }

    /// Restore from `dir`, or start fresh with `seed` admitted.
    ///
    /// Returns true if a snapshot was restored. A missing or damaged snapshot
    /// is never fatal.
    pub fn restore_or_seed(&mut self, dir: &Path, seed: &str) -> bool {
        match self.restore(dir) {
            Ok(()) => {
                let stats = self.stats();
                info!(
                    "Restored frontier from {}: {} queued, {} seen, {} fetched, {} traps",
                    dir.display(),
                    stats.queue_len,
                    stats.seen_count,
                    stats.fetched,
                    stats.trap_count
                );
                true
            }
            Err(e) => {
                if e.is_missing() {
                    info!("No frontier snapshot in {}, starting from {}", dir.display(), seed);
                } else {
                    warn!("Discarding frontier snapshot in {}: {}", dir.display(), e);
                }
                self.apply_snapshot(FrontierSnapshot::default());
                self.add(seed);
                false
            }
        }
    }
}
