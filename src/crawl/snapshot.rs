//! Frontier persistence
//!
//! Each checkpoint is a generation directory `gen-<n>` under the state
//! directory, holding one blob per field. Every blob is bincode inside an
//! [`Envelope`] carrying a format tag, a schema version and the generation.
//!
//! A generation is written into `gen-<n>.tmp`, synced, then published with a
//! single directory rename, so a crash mid-checkpoint never touches the last
//! published generation. Loading takes the newest published generation that
//! decodes cleanly; the one before it is kept on disk as a fallback.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use super::fingerprint::Fingerprint;

/// Format tag stored in every blob
pub const SNAPSHOT_FORMAT: &str = "crawlguard-frontier";

/// Current blob schema version
pub const SNAPSHOT_VERSION: u32 = 1;

const QUEUE_FILE: &str = "url_queue.bin";
const SEEN_FILE: &str = "url_set.bin";
const FETCHED_FILE: &str = "fetched.bin";
const FINGERPRINTS_FILE: &str = "fingerprints.bin";
const TRAPS_FILE: &str = "traps.bin";

const GENERATION_PREFIX: &str = "gen-";

/// Published generations kept on disk
const KEEP_GENERATIONS: usize = 2;

/// Snapshot load/save errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {blob}: {source}")]
    Encode {
        blob: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to decode {blob}: {source}")]
    Decode {
        blob: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("no frontier snapshot in {0}")]
    NoSnapshot(PathBuf),

    #[error("snapshot blob {0} is missing")]
    Missing(&'static str),

    #[error("{blob} has format '{found}', expected '{SNAPSHOT_FORMAT}'")]
    FormatMismatch { blob: &'static str, found: String },

    #[error("{blob} has version {found}, expected {SNAPSHOT_VERSION}")]
    VersionMismatch { blob: &'static str, found: u32 },

    #[error("torn snapshot: {blob} belongs to generation {found}, expected {expected}")]
    TornSnapshot {
        blob: &'static str,
        expected: u64,
        found: u64,
    },
}

impl SnapshotError {
    /// No snapshot was ever published (as opposed to a damaged one)
    pub fn is_missing(&self) -> bool {
        matches!(self, SnapshotError::NoSnapshot(_))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Versioned wrapper around one blob
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    format: String,
    version: u32,
    generation: u64,
    payload: T,
}

/// Envelope fields without the payload, decoded first to classify foreign files
#[derive(Debug, Deserialize)]
struct EnvelopeHeader {
    format: String,
    version: u32,
    generation: u64,
}

/// Trap set plus the counters that feed it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapState {
    pub traps: BTreeSet<String>,
    pub near_duplicates: HashMap<String, u32>,
    pub domain_visits: HashMap<String, u32>,
}

/// Point-in-time copy of all frontier state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontierSnapshot {
    pub queue: VecDeque<String>,
    pub seen: HashSet<String>,
    pub fetched: u64,
    pub fingerprints: HashMap<String, Vec<Fingerprint>>,
    pub trap_state: TrapState,
}

impl FrontierSnapshot {
    /// Publish every blob as a new generation under `dir`, returning it
    ///
    /// Older generations beyond the fallback one are pruned afterwards.
    pub fn save(&self, dir: &Path) -> Result<u64, SnapshotError> {
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

        let generation = next_generation(generations(dir)?.first().copied());
        let blobs = [
            (QUEUE_FILE, encode(QUEUE_FILE, generation, &self.queue)?),
            (SEEN_FILE, encode(SEEN_FILE, generation, &self.seen)?),
            (FETCHED_FILE, encode(FETCHED_FILE, generation, &self.fetched)?),
            (FINGERPRINTS_FILE, encode(FINGERPRINTS_FILE, generation, &self.fingerprints)?),
            (TRAPS_FILE, encode(TRAPS_FILE, generation, &self.trap_state)?),
        ];

        let published = generation_path(dir, generation);
        let pending = published.with_extension("tmp");
        if pending.exists() {
            fs::remove_dir_all(&pending).map_err(|e| io_error(&pending, e))?;
        }
        fs::create_dir(&pending).map_err(|e| io_error(&pending, e))?;

        for (name, bytes) in &blobs {
            write_synced(&pending.join(name), bytes)?;
        }
        sync_dir(&pending)?;

        fs::rename(&pending, &published).map_err(|e| io_error(&published, e))?;
        sync_dir(dir)?;

        prune(dir, generation);
        Ok(generation)
    }

    /// Read the newest usable generation from `dir`
    ///
    /// A generation that fails to load is skipped in favour of an older one.
    /// The traps blob is optional; without it the trap state starts empty.
    pub fn load(dir: &Path) -> Result<Self, SnapshotError> {
        let mut newest_error = None;

        for generation in generations(dir)? {
            match Self::load_generation(&generation_path(dir, generation), generation) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    warn!("Skipping frontier generation {} in {}: {}", generation, dir.display(), e);
                    newest_error.get_or_insert(e);
                }
            }
        }

        Err(newest_error.unwrap_or_else(|| SnapshotError::NoSnapshot(dir.to_path_buf())))
    }

    fn load_generation(path: &Path, generation: u64) -> Result<Self, SnapshotError> {
        let queue = read_blob(path, QUEUE_FILE, generation)?;
        let seen = read_blob(path, SEEN_FILE, generation)?;
        let fetched = read_blob(path, FETCHED_FILE, generation)?;
        let fingerprints = read_blob(path, FINGERPRINTS_FILE, generation)?;

        let trap_state = match read_blob::<TrapState>(path, TRAPS_FILE, generation) {
            Ok(state) => state,
            Err(SnapshotError::Missing(_)) => TrapState::default(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            queue,
            seen,
            fetched,
            fingerprints,
            trap_state,
        })
    }

    /// Whether `dir` holds at least one published generation
    pub fn exists(dir: &Path) -> bool {
        generations(dir).map(|g| !g.is_empty()).unwrap_or(false)
    }
}

/// Directory holding generation `generation` under `dir`
pub fn generation_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}{:020}", GENERATION_PREFIX, generation))
}

/// Published generations in `dir`, newest first
pub fn generations(dir: &Path) -> Result<Vec<u64>, SnapshotError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir, e)),
    };

    let mut found: Vec<u64> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| parse_generation(&entry.file_name().to_string_lossy()))
        .collect();
    found.sort_unstable_by(|a, b| b.cmp(a));
    Ok(found)
}

/// Generation number of a published directory name; pending `.tmp` names don't parse
fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

/// Strictly after `previous`, even when the clock hasn't moved
fn next_generation(previous: Option<u64>) -> u64 {
    let now = chrono::Utc::now().timestamp_micros().max(0) as u64;
    previous.map_or(now, |previous| now.max(previous + 1))
}

/// Remove pending leftovers and all but the newest published generations
fn prune(dir: &Path, current: u64) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let keep: Vec<u64> = generations(dir)
        .unwrap_or_default()
        .into_iter()
        .take(KEEP_GENERATIONS)
        .collect();

    for entry in entries.filter_map(|entry| entry.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let stale = match name.strip_suffix(".tmp").and_then(parse_generation) {
            Some(pending) => pending < current,
            None => parse_generation(&name).is_some_and(|g| !keep.contains(&g)),
        };
        if stale {
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!("Failed to prune {}: {}", entry.path().display(), e);
            }
        }
    }
}

fn encode<T: Serialize>(blob: &'static str, generation: u64, payload: &T) -> Result<Vec<u8>, SnapshotError> {
    let envelope = Envelope {
        format: SNAPSHOT_FORMAT.to_string(),
        version: SNAPSHOT_VERSION,
        generation,
        payload,
    };
    bincode::serialize(&envelope).map_err(|source| SnapshotError::Encode { blob, source })
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let mut file = File::create(path).map_err(|e| io_error(path, e))?;
    file.write_all(bytes).map_err(|e| io_error(path, e))?;
    file.sync_all().map_err(|e| io_error(path, e))
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<(), SnapshotError> {
    File::open(path)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| io_error(path, e))
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<(), SnapshotError> {
    Ok(())
}

fn read_blob<T: DeserializeOwned>(dir: &Path, blob: &'static str, generation: u64) -> Result<T, SnapshotError> {
    let path = dir.join(blob);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotError::Missing(blob));
        }
        Err(source) => return Err(SnapshotError::Io { path, source }),
    };

    let header: EnvelopeHeader =
        bincode::deserialize(&bytes).map_err(|source| SnapshotError::Decode { blob, source })?;

    if header.format != SNAPSHOT_FORMAT {
        return Err(SnapshotError::FormatMismatch {
            blob,
            found: header.format,
        });
    }
    if header.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::VersionMismatch {
            blob,
            found: header.version,
        });
    }
    if header.generation != generation {
        return Err(SnapshotError::TornSnapshot {
            blob,
            expected: generation,
            found: header.generation,
        });
    }

    let envelope: Envelope<T> =
        bincode::deserialize(&bytes).map_err(|source| SnapshotError::Decode { blob, source })?;
    Ok(envelope.payload)
}
