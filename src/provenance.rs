/// Provenance index for collected shapes
///
/// Answers "where has this string been seen" across sessions. Each
/// canonical shape maps to the set of contexts that produced it, the
/// first and last sighting timestamps, and a total sighting count. The
/// index lives in one TSV file and is rewritten wholesale on flush;
/// rows stay sorted by shape so diffs of the file are stable.
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::atomic;
use crate::canonical;
use crate::error::UilexResult;
use crate::exports;
use crate::util;

const HEADER: &str = "key_shape\tmods\tfirst_seen_utc\tlast_seen_utc\tcount";

/// Everything recorded about one shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceEntry {
    /// Contexts that produced the shape, sorted
    pub contexts: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Sightings across all sessions
    pub count: u64,
}

struct ProvState {
    map: BTreeMap<String, ProvenanceEntry>,
    dirty: bool,
}

/// On-disk provenance index with in-memory working copy
pub struct ProvenanceStore {
    path: PathBuf,
    state: Mutex<ProvState>,
}

impl ProvenanceStore {
    /// An empty index that will persist to `path`
    pub fn new(path: PathBuf) -> Self {
        ProvenanceStore {
            path,
            state: Mutex::new(ProvState {
                map: BTreeMap::new(),
                dirty: false,
            }),
        }
    }

    /// Read the index file back into memory, replacing current entries
    ///
    /// A missing file yields an empty index. Malformed rows (too few
    /// columns, unparsable timestamps) are dropped and counted; a row
    /// whose count column does not parse keeps the row with a count of
    /// zero. Returns the number of entries loaded.
    pub fn load(&self) -> usize {
        let mut fresh = BTreeMap::new();
        let mut skipped = 0usize;
        if let Ok(bytes) = fs::read(&self.path) {
            let text = String::from_utf8_lossy(&bytes);
            for line in text.lines() {
                if line.trim().is_empty() || line.starts_with('#') || line == HEADER {
                    continue;
                }
                let cols: Vec<&str> = line.split('\t').collect();
                if cols.len() < 5 {
                    skipped += 1;
                    continue;
                }
                let (Some(first_seen), Some(last_seen)) =
                    (util::parse_iso_utc(cols[2]), util::parse_iso_utc(cols[3]))
                else {
                    skipped += 1;
                    continue;
                };
                let contexts = cols[1]
                    .split(';')
                    .filter(|c| !c.is_empty())
                    .map(|c| c.to_string())
                    .collect();
                let count = cols[4].trim().parse::<u64>().unwrap_or(0);
                // a later duplicate of the same shape replaces the earlier row
                fresh.insert(
                    cols[0].to_string(),
                    ProvenanceEntry {
                        contexts,
                        first_seen,
                        last_seen,
                        count,
                    },
                );
            }
        }
        let loaded = fresh.len();
        if skipped > 0 {
            warn!(path = %self.path.display(), skipped, "provenance rows dropped while loading");
        }
        info!(path = %self.path.display(), entries = loaded, "provenance index loaded");

        let mut state = self.state.lock().unwrap();
        state.map = fresh;
        state.dirty = false;
        loaded
    }

    /// Record a sighting of `shape` in `context` at the current time.
    pub fn register(&self, shape: &str, context: &str) {
        self.register_at(shape, context, Utc::now());
    }

    /// Record a sighting with the clock passed in. Empty shapes are
    /// ignored; an empty context updates timestamps and count without
    /// adding to the context set.
    pub fn register_at(&self, shape: &str, context: &str, at: DateTime<Utc>) {
        if shape.is_empty() {
            return;
        }
        let context = canonical::sanitize_field(context);
        let mut state = self.state.lock().unwrap();
        apply_sighting(&mut state.map, shape, &context, at);
        state.dirty = true;
    }

    /// Write the index file if there are unsaved changes
    ///
    /// Rendering happens under the lock, the atomic write outside it. On
    /// a write failure the entries are re-marked dirty so the next flush
    /// retries. Returns whether a write happened.
    pub fn flush(&self, force: bool) -> UilexResult<bool> {
        let rendered = {
            let mut state = self.state.lock().unwrap();
            if !state.dirty && !force {
                return Ok(false);
            }
            state.dirty = false;
            render(&state.map)
        };
        if let Err(err) = atomic::write_atomic(&self.path, rendered.as_bytes()) {
            self.state.lock().unwrap().dirty = true;
            return Err(err);
        }
        Ok(true)
    }

    /// Rebuild the index from the export tree, discarding current entries
    ///
    /// Walks every per-context directory (and the ungrouped `Current`
    /// directory) under `export_root`. The row file is preferred when
    /// present: each row registers one sighting, with the row's own
    /// context column and timestamp when they are usable and the
    /// directory name and current time otherwise. Directories with only
    /// a text list register one sighting per line under the directory
    /// name. Ends with a forced flush. Returns the entry count and the
    /// number of distinct contexts seen.
    pub fn rebuild_from_exports(
        &self,
        export_root: &Path,
        per_context_subdir: &str,
    ) -> UilexResult<(usize, usize)> {
        let mut fresh = BTreeMap::new();
        let mut contexts_seen: HashSet<String> = HashSet::new();
        let now = Utc::now();

        for dir in exports::export_dirs(export_root, per_context_subdir)? {
            let dirname = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let rows_path = dir.join(exports::ROWS_FILE);
            let texts_path = dir.join(exports::TEXTS_FILE);
            if rows_path.is_file() {
                for row in exports::read_rows(&rows_path)? {
                    if row.text.is_empty() {
                        continue;
                    }
                    let context = if row.context.is_empty() {
                        dirname.clone()
                    } else {
                        row.context
                    };
                    let at = row.timestamp.unwrap_or(now);
                    contexts_seen.insert(context.clone());
                    apply_sighting(&mut fresh, &row.text, &context, at);
                }
            } else if texts_path.is_file() {
                let bytes = fs::read(&texts_path)
                    .map_err(|err| crate::error::UilexError::io(&texts_path, err))?;
                for line in String::from_utf8_lossy(&bytes).lines() {
                    if line.trim().is_empty() || line.starts_with('#') {
                        continue;
                    }
                    contexts_seen.insert(dirname.clone());
                    apply_sighting(&mut fresh, line, &dirname, now);
                }
            }
        }

        let entries = fresh.len();
        {
            let mut state = self.state.lock().unwrap();
            state.map = fresh;
            state.dirty = true;
        }
        self.flush(true)?;
        info!(
            entries,
            contexts = contexts_seen.len(),
            "provenance index rebuilt from exports"
        );
        Ok((entries, contexts_seen.len()))
    }

    /// Number of distinct shapes in the index
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().map.len()
    }

    /// Whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of one entry, if the shape is known
    pub fn entry(&self, shape: &str) -> Option<ProvenanceEntry> {
        self.state.lock().unwrap().map.get(shape).cloned()
    }
}

fn apply_sighting(
    map: &mut BTreeMap<String, ProvenanceEntry>,
    shape: &str,
    context: &str,
    at: DateTime<Utc>,
) {
    match map.get_mut(shape) {
        Some(entry) => {
            entry.count += 1;
            if at < entry.first_seen {
                entry.first_seen = at;
            }
            if at > entry.last_seen {
                entry.last_seen = at;
            }
            if !context.is_empty() {
                entry.contexts.insert(context.to_string());
            }
        }
        None => {
            let mut contexts = BTreeSet::new();
            if !context.is_empty() {
                contexts.insert(context.to_string());
            }
            map.insert(
                shape.to_string(),
                ProvenanceEntry {
                    contexts,
                    first_seen: at,
                    last_seen: at,
                    count: 1,
                },
            );
        }
    }
}

fn render(map: &BTreeMap<String, ProvenanceEntry>) -> String {
    let mut out = String::with_capacity(64 + map.len() * 64);
    out.push_str(HEADER);
    out.push('\n');
    for (shape, entry) in map {
        let contexts: Vec<&str> = entry.contexts.iter().map(|c| c.as_str()).collect();
        out.push_str(shape);
        out.push('\t');
        out.push_str(&contexts.join(";"));
        out.push('\t');
        out.push_str(&util::iso_utc(entry.first_seen));
        out.push('\t');
        out.push_str(&util::iso_utc(entry.last_seen));
        out.push('\t');
        out.push_str(&entry.count.to_string());
        out.push('\n');
    }
    out
}
