/// Two-tier translation dictionary
///
/// The dictionary resource is UTF-8 text: `#`-prefixed comment lines are
/// ignored and every data line is `english<TAB>translation`. The english
/// side is canonicalized on load; if the canonical key contains the shape
/// placeholder it lands in the shaped table (its translation is a template),
/// otherwise in the exact table. The first occurrence of a key wins; later
/// duplicates are counted and dropped.
///
/// Reload is wholesale: both tables are rebuilt into fresh maps and swapped
/// in under the lock in one step, so a concurrent `resolve` never observes a
/// half-populated table.
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::canonical;
use crate::shape::{self, PLACEHOLDER, ShapeParts};

/// Counters from one dictionary load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Total lines read, including comments and blanks
    pub lines: usize,
    /// Entries stored in the exact table
    pub exact: usize,
    /// Entries stored in the shaped table
    pub shaped: usize,
    /// Lines whose canonical key was already stored, dropped
    pub duplicates: usize,
}

#[derive(Default)]
struct Tables {
    exact: HashMap<String, String>,
    shaped: HashMap<String, String>,
}

/// Holder of the exact and shaped lookup tables
pub struct DictionaryStore {
    tables: Mutex<Tables>,
}

impl DictionaryStore {
    /// An empty store; call [`load_from`](Self::load_from) to populate it
    pub fn new() -> Self {
        DictionaryStore {
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Load (or reload) the dictionary from `path`
    ///
    /// Never fails: a missing or unreadable file logs a warning and installs
    /// empty tables, and invalid UTF-8 byte sequences are replaced rather
    /// than rejected. Parsing happens before the lock is taken so resolvers
    /// are only blocked for the swap itself.
    pub fn load_from(&self, path: &Path) -> LoadStats {
        let mut fresh = Tables::default();
        let mut stats = LoadStats::default();

        match fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                for raw in text.lines() {
                    stats.lines += 1;
                    if raw.trim().is_empty() || raw.starts_with('#') {
                        continue;
                    }
                    let Some(tab) = raw.find('\t') else { continue };
                    if tab == 0 {
                        continue;
                    }
                    let key = canonical::canonicalize(&raw[..tab]);
                    let translation = canonical::tokenize_newlines(&raw[tab + 1..]);

                    let table = if key.contains(PLACEHOLDER) {
                        &mut fresh.shaped
                    } else {
                        &mut fresh.exact
                    };
                    if table.contains_key(&key) {
                        stats.duplicates += 1;
                    } else {
                        table.insert(key, translation);
                    }
                }
                stats.exact = fresh.exact.len();
                stats.shaped = fresh.shaped.len();
                info!(
                    path = %path.display(),
                    lines = stats.lines,
                    exact = stats.exact,
                    shaped = stats.shaped,
                    duplicates = stats.duplicates,
                    "dictionary loaded"
                );
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "dictionary load failed, tables empty");
            }
        }

        *self.tables.lock().unwrap() = fresh;
        stats
    }

    /// Resolve a canonical key to its translation
    ///
    /// Tries the exact table first, then the shaped table with the numbers
    /// of the key substituted into the stored template. An entry with an
    /// empty translation column is treated as a miss in both tables, so a
    /// half-filled template scaffold never blanks live text.
    pub fn resolve(&self, key: &str) -> Option<String> {
        self.resolve_with_parts(key, &shape::make_shape(key))
    }

    /// Like [`resolve`](Self::resolve) for callers that already computed the
    /// shape of the key.
    pub fn resolve_with_parts(&self, key: &str, parts: &ShapeParts) -> Option<String> {
        let tables = self.tables.lock().unwrap();
        if let Some(translation) = tables.exact.get(key) {
            if !translation.is_empty() {
                return Some(translation.clone());
            }
        }
        if let Some(template) = tables.shaped.get(&parts.shape) {
            if !template.is_empty() {
                return Some(shape::fill_template(template, &parts.numbers));
            }
        }
        None
    }

    /// Whether the key or its shape appears in either table, regardless of
    /// whether the stored translation is filled in. This is the membership
    /// test the missing-translation outputs use.
    pub fn is_known(&self, key: &str, shape_key: &str) -> bool {
        let tables = self.tables.lock().unwrap();
        tables.exact.contains_key(key)
            || tables.shaped.contains_key(key)
            || tables.exact.contains_key(shape_key)
            || tables.shaped.contains_key(shape_key)
    }

    /// Total entries across both tables
    pub fn len(&self) -> usize {
        let tables = self.tables.lock().unwrap();
        tables.exact.len() + tables.shaped.len()
    }

    /// Whether the store holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DictionaryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with(content: &str) -> (tempfile::TempDir, DictionaryStore, LoadStats) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dict.tsv");
        fs::write(&path, content).unwrap();
        let store = DictionaryStore::new();
        let stats = store.load_from(&path);
        (dir, store, stats)
    }

    #[test]
    fn test_load_sorts_entries_into_both_tables() {
        let (_dir, store, stats) = store_with(
            "# comment line\n\
             \n\
             Save game\tセーブ\n\
             HP: #/#\tHP：#/#\n\
             Save game\tduplicate\n\
             no tab on this line\n",
        );
        assert_eq!(stats.exact, 1);
        assert_eq!(stats.shaped, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.lines, 6);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_missing_file_installs_empty_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dict.tsv");
        fs::write(&path, "Key\tValue\n").unwrap();
        let store = DictionaryStore::new();
        store.load_from(&path);
        assert_eq!(store.len(), 1);

        store.load_from(&dir.path().join("gone.tsv"));
        assert_eq!(store.len(), 0);
        assert!(store.resolve("Key").is_none());
    }

    #[test]
    fn test_exact_entry_wins_over_shape_entry() {
        let (_dir, store, _) = store_with(
            "HP: 10/20\tちょうど半分\n\
             HP: #/#\tHP：#/#\n",
        );
        assert_eq!(store.resolve("HP: 10/20").as_deref(), Some("ちょうど半分"));
        // other numbers still go through the template
        assert_eq!(store.resolve("HP: 3/20").as_deref(), Some("HP：3/20"));
    }

    #[test]
    fn test_shape_template_reconstruction() {
        let (_dir, store, _) = store_with("HP: #/#\tHP：#/#\n");
        assert_eq!(store.resolve("HP: 10/20").as_deref(), Some("HP：10/20"));
    }

    #[test]
    fn test_empty_translation_is_a_miss() {
        let (_dir, store, _) = store_with(
            "Untranslated yet\t\n\
             Count: #\t\n",
        );
        assert!(store.resolve("Untranslated yet").is_none());
        assert!(store.resolve("Count: 7").is_none());
        // but both still count as known for the missing-translation check
        assert!(store.is_known("Untranslated yet", "Untranslated yet"));
        assert!(store.is_known("Count: 7", "Count: #"));
    }

    #[test]
    fn test_first_duplicate_wins() {
        let (_dir, store, stats) = store_with(
            "Greeting\tこんにちは\n\
             Greeting\tやあ\n",
        );
        assert_eq!(stats.duplicates, 1);
        assert_eq!(store.resolve("Greeting").as_deref(), Some("こんにちは"));
    }

    #[test]
    fn test_english_side_is_canonicalized_on_load() {
        let (_dir, store, _) = store_with("  Padded   key \t値\n");
        assert_eq!(store.resolve("Padded key").as_deref(), Some("値"));
    }

    #[test]
    fn test_translation_spacing_preserved() {
        let (_dir, store, _) = store_with("Key\ttwo  spaces  kept\n");
        assert_eq!(store.resolve("Key").as_deref(), Some("two  spaces  kept"));
    }

    #[test]
    fn test_newline_spellings_unify_across_key_and_value() {
        let (_dir, store, _) = store_with("first \\nsecond\t一行目\\n二行目\n");
        // lookup by any spelling of the same visible text
        let key = crate::canonical::canonicalize("first\r\nsecond");
        assert_eq!(store.resolve(&key).as_deref(), Some("一行目/n二行目"));
    }

    #[test]
    fn test_reload_is_wholesale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dict.tsv");
        fs::write(&path, "Old\t古い\n").unwrap();
        let store = DictionaryStore::new();
        store.load_from(&path);

        fs::write(&path, "New\t新しい\n").unwrap();
        store.load_from(&path);
        assert!(store.resolve("Old").is_none());
        assert_eq!(store.resolve("New").as_deref(), Some("新しい"));
    }
}
