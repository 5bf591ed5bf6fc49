/// The translation-and-collection session
///
/// [`Session`] is the facade the host calls on its UI path. One call,
/// [`translate_or_enroll`](Session::translate_or_enroll), does the whole
/// job: normalize the incoming string, try the dictionary, and when the
/// lookup misses, classify the string and enroll it into the export tree
/// so a translator sees it. The call never blocks on disk beyond small
/// appends and never fails; I/O trouble is logged, counted and swallowed
/// because the host's UI must keep rendering whatever happens here.
///
/// Shared state is split per concern (dictionary tables, noise counters,
/// enrollment gates, export buffers) so the hot path takes short,
/// independent locks instead of one big one.
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::canonical::{self, NEWLINE_TOKEN};
use crate::config::SessionConfig;
use crate::context::ContextFilter;
use crate::debounce::Debouncer;
use crate::dictionary::{DictionaryStore, LoadStats};
use crate::error::UilexResult;
use crate::exports::{ExportSink, RebuildSummary};
use crate::noise::NoiseClassifier;
use crate::provenance::ProvenanceStore;
use crate::shape::{self, ShapeParts};
use crate::watch::DictWatcher;

/// Repeat sightings of one shape inside this window are dropped before
/// they reach provenance or the export files.
pub(crate) const ENROLL_DEBOUNCE_MS: i64 = 2000;

/// Counter snapshot, either one session slice or the running totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Lookups answered from the dictionary
    pub replaced: u64,
    /// Strings newly enrolled into the export tree
    pub collected: u64,
    /// Export or index writes that failed
    pub io_errors: u64,
}

#[derive(Default)]
struct Counters {
    session_replaced: AtomicU64,
    session_collected: AtomicU64,
    session_io_errors: AtomicU64,
    total_replaced: AtomicU64,
    total_collected: AtomicU64,
    total_io_errors: AtomicU64,
}

impl Counters {
    fn add_replaced(&self, n: u64) {
        self.session_replaced.fetch_add(n, Ordering::Relaxed);
    }

    fn add_collected(&self) {
        self.session_collected.fetch_add(1, Ordering::Relaxed);
    }

    fn add_io_error(&self) {
        self.session_io_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn take_session(&self) -> SessionStats {
        let taken = SessionStats {
            replaced: self.session_replaced.swap(0, Ordering::Relaxed),
            collected: self.session_collected.swap(0, Ordering::Relaxed),
            io_errors: self.session_io_errors.swap(0, Ordering::Relaxed),
        };
        self.total_replaced.fetch_add(taken.replaced, Ordering::Relaxed);
        self.total_collected.fetch_add(taken.collected, Ordering::Relaxed);
        self.total_io_errors.fetch_add(taken.io_errors, Ordering::Relaxed);
        taken
    }

    fn totals(&self) -> SessionStats {
        // the live session slice is included so totals never go backwards
        SessionStats {
            replaced: self.total_replaced.load(Ordering::Relaxed)
                + self.session_replaced.load(Ordering::Relaxed),
            collected: self.total_collected.load(Ordering::Relaxed)
                + self.session_collected.load(Ordering::Relaxed),
            io_errors: self.total_io_errors.load(Ordering::Relaxed)
                + self.session_io_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
struct EnrollState {
    /// shape -> last sighting, epoch milliseconds
    recent_seen: HashMap<String, i64>,
    /// shapes whose files have been written this session
    seen_once: HashSet<String>,
}

/// A running translation-and-collection session
pub struct Session {
    config: SessionConfig,
    dictionary: Arc<DictionaryStore>,
    noise: Mutex<NoiseClassifier>,
    context_filter: ContextFilter,
    self_contexts: HashSet<String>,
    sink: Arc<ExportSink>,
    provenance: Arc<ProvenanceStore>,
    counters: Arc<Counters>,
    enroll: Mutex<EnrollState>,
    flusher: Debouncer,
    _watcher: Option<DictWatcher>,
}

impl Session {
    /// Build a session: load the dictionary and provenance index, set up
    /// the export sink and the coalesced flusher, and optionally start
    /// the dictionary watcher
    ///
    /// A missing dictionary or index file is not an error; the session
    /// starts empty and collects. A watcher that cannot start degrades
    /// to no watching with a warning.
    ///
    /// # Example
    /// ```ignore
    /// let config = SessionConfig::for_root(Path::new("/opt/game/Lex"));
    /// let session = Session::new(config)?;
    /// if let Some(translated) = session.translate_or_enroll("Save game", "MainMenu", "button", "") {
    ///     label.set_text(&translated);
    /// }
    /// ```
    pub fn new(config: SessionConfig) -> UilexResult<Session> {
        let dictionary = Arc::new(DictionaryStore::new());
        dictionary.load_from(&config.dictionary_path);

        let provenance = Arc::new(ProvenanceStore::new(config.provenance_path()));
        provenance.load();

        let sink = Arc::new(ExportSink::new(&config));
        let counters = Arc::new(Counters::default());

        let flush_sink = Arc::clone(&sink);
        let flush_prov = Arc::clone(&provenance);
        let flush_counters = Arc::clone(&counters);
        let flusher = Debouncer::new(
            "flush",
            Duration::from_millis(config.aggregate_debounce_ms),
            Arc::new(move || {
                if let Err(err) = flush_sink.flush_aggregate() {
                    warn!(error = %err, "aggregate flush failed");
                    flush_counters.add_io_error();
                }
                if let Err(err) = flush_prov.flush(false) {
                    warn!(error = %err, "provenance flush failed");
                    flush_counters.add_io_error();
                }
            }),
        )?;

        let watcher = if config.watch_dictionary {
            let watched = Arc::clone(&dictionary);
            let watched_path = config.dictionary_path.clone();
            match DictWatcher::start(
                &config.dictionary_path,
                Arc::new(move || {
                    watched.load_from(&watched_path);
                }),
            ) {
                Ok(w) => Some(w),
                Err(err) => {
                    warn!(error = %err, "dictionary watch unavailable");
                    None
                }
            }
        } else {
            None
        };

        Ok(Session {
            noise: Mutex::new(NoiseClassifier::new(config.min_length, &config.exclude_patterns)),
            context_filter: ContextFilter::new(
                &config.allowed_contexts,
                &config.denied_contexts,
                config.log_excluded_contexts,
            ),
            self_contexts: config
                .self_contexts
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
            dictionary,
            sink,
            provenance,
            counters,
            enroll: Mutex::new(EnrollState::default()),
            flusher,
            _watcher: watcher,
            config,
        })
    }

    /// Translate a UI string, enrolling it for collection on a miss
    ///
    /// Returns the translation with real newlines restored, or `None`
    /// when the host should keep showing the original text. `None`
    /// covers every non-hit: excluded or self context, noise, and plain
    /// dictionary misses (which are also the ones that get enrolled).
    ///
    /// # Arguments
    /// * `text` - the string as the UI is about to render it
    /// * `context` - screen or subsystem tag, may be empty
    /// * `source` - widget kind or call site hint, may be empty
    /// * `scope` - finer-grained hint within the source, may be empty
    pub fn translate_or_enroll(
        &self,
        text: &str,
        context: &str,
        source: &str,
        scope: &str,
    ) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        if !self.self_contexts.is_empty()
            && self.self_contexts.contains(&context.to_lowercase())
        {
            return None;
        }
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        if self.context_filter.is_excluded_at(context, now_ms) {
            return None;
        }

        let key = canonical::canonicalize(text);
        if key.is_empty() {
            return None;
        }
        let parts = shape::make_shape(&key);

        if let Some(translation) = self.dictionary.resolve_with_parts(&key, &parts) {
            self.counters.add_replaced(1);
            return Some(canonical::reify(&translation));
        }

        if key.contains(NEWLINE_TOKEN) && (hints_tooltip(source) || hints_tooltip(scope)) {
            if let Some(stitched) = self.tooltip_fallback(&key) {
                return Some(stitched);
            }
        }

        if self.noise.lock().unwrap().is_noise_at(text, &parts, now_ms) {
            return None;
        }

        self.try_enroll_once(&parts, context, source, scope, now, now_ms);
        None
    }

    /// Per-line lookup for multi-line tooltip bodies
    ///
    /// Tooltips are often assembled from independently translated lines
    /// (a title, stat lines, a hint). When the whole body misses, each
    /// line is resolved on its own and the hits are stitched back in
    /// between the untranslated lines. Misses are left alone and not
    /// enrolled; the lines that matter arrive separately through their
    /// own widgets.
    fn tooltip_fallback(&self, key: &str) -> Option<String> {
        let mut hits: u64 = 0;
        let stitched: Vec<String> = key
            .split(NEWLINE_TOKEN)
            .map(|segment| {
                let line = segment.trim();
                if line.is_empty() {
                    return String::new();
                }
                let parts = shape::make_shape(line);
                match self.dictionary.resolve_with_parts(line, &parts) {
                    Some(translation) => {
                        hits += 1;
                        translation
                    }
                    None => line.to_string(),
                }
            })
            .collect();
        if hits == 0 {
            return None;
        }
        self.counters.add_replaced(hits);
        Some(canonical::reify(&stitched.join(NEWLINE_TOKEN)))
    }

    fn try_enroll_once(
        &self,
        parts: &ShapeParts,
        context: &str,
        source: &str,
        scope: &str,
        now: DateTime<Utc>,
        now_ms: i64,
    ) {
        let shape_line = parts.shape.as_str();
        if shape_line.is_empty() {
            return;
        }

        let first_time = {
            let mut state = self.enroll.lock().unwrap();
            if let Some(&stamp) = state.recent_seen.get(shape_line) {
                if now_ms - stamp < ENROLL_DEBOUNCE_MS {
                    return;
                }
            }
            state.recent_seen.insert(shape_line.to_string(), now_ms);
            state.seen_once.insert(shape_line.to_string())
        };

        // every sighting past the repeat gate counts toward provenance,
        // only the first one writes export files
        self.provenance.register_at(shape_line, context, now);

        if first_time {
            self.counters.add_collected();
            if let Err(err) = self.sink.record(context, source, scope, shape_line, now) {
                warn!(error = %err, "export write failed");
                self.counters.add_io_error();
            }
            self.sink.enqueue_aggregate(shape_line);
        }
        self.flusher.arm();
    }

    /// Reload the dictionary from its configured path.
    pub fn reload_dictionary(&self) -> LoadStats {
        self.dictionary.load_from(&self.config.dictionary_path)
    }

    /// Entries currently loaded across both dictionary tables.
    pub fn dictionary_len(&self) -> usize {
        self.dictionary.len()
    }

    /// Regenerate the `_All` listings from the per-context export files.
    pub fn rebuild(&self) -> UilexResult<RebuildSummary> {
        self.sink.rebuild(&self.dictionary)
    }

    /// Write the fill-in dictionary template from the untranslated
    /// listing. Returns the template path and its row count.
    pub fn write_template(&self) -> UilexResult<(PathBuf, usize)> {
        self.sink.write_template()
    }

    /// Rebuild the provenance index from the export tree. Returns the
    /// entry count and the number of distinct contexts.
    pub fn rebuild_provenance(&self) -> UilexResult<(usize, usize)> {
        self.provenance
            .rebuild_from_exports(&self.config.export_root, &self.config.per_context_subdir)
    }

    /// Flush buffered aggregate lines and the provenance index now
    /// instead of waiting for the coalescing delay. `force` writes the
    /// index even when it has no unsaved changes.
    pub fn flush(&self, force: bool) -> UilexResult<()> {
        self.sink.flush_aggregate()?;
        self.provenance.flush(force)?;
        Ok(())
    }

    /// Counters since the last take, folded into the running totals.
    pub fn take_session_stats(&self) -> SessionStats {
        self.counters.take_session()
    }

    /// All-time counters, including the slice not yet taken.
    pub fn totals(&self) -> SessionStats {
        self.counters.totals()
    }

    /// Contexts turned away by the allow/deny filter, all-time.
    pub fn excluded_contexts(&self) -> u64 {
        self.context_filter.excluded_count()
    }

    /// Shapes in the provenance index.
    pub fn provenance_len(&self) -> usize {
        self.provenance.len()
    }

    /// Stop or resume aggregate buffering; per-context collection keeps
    /// running either way.
    pub fn set_pause_aggregate(&self, paused: bool) {
        self.sink.set_paused(paused);
    }

    pub fn is_aggregate_paused(&self) -> bool {
        self.sink.is_paused()
    }

    /// Forget the repeat gates and noise churn counters so a fresh run
    /// (a new save, a different screen flow) collects from scratch.
    /// Returns the number of seen shapes and recent-sighting stamps
    /// dropped.
    pub fn clear_session_caches(&self) -> (usize, usize) {
        let (seen, recent) = {
            let mut state = self.enroll.lock().unwrap();
            let sizes = (state.seen_once.len(), state.recent_seen.len());
            state.recent_seen.clear();
            state.seen_once.clear();
            sizes
        };
        self.noise.lock().unwrap().clear_dynamic();
        info!(seen, recent, "session caches cleared");
        (seen, recent)
    }
}

fn hints_tooltip(hint: &str) -> bool {
    !hint.is_empty() && hint.to_ascii_lowercase().contains("tooltip")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_dict(root: &Path, content: &str) {
        let dict_dir = root.join("Dict");
        fs::create_dir_all(&dict_dir).unwrap();
        fs::write(dict_dir.join("strings.tsv"), content).unwrap();
    }

    fn session_in(root: &Path) -> Session {
        let mut cfg = SessionConfig::for_root(root);
        // zero delay makes every flush inline and the tests deterministic
        cfg.aggregate_debounce_ms = 0;
        Session::new(cfg).unwrap()
    }

    #[test]
    fn test_known_string_is_translated() {
        let dir = tempdir().unwrap();
        write_dict(dir.path(), "Save game\tセーブ\n");
        let session = session_in(dir.path());

        let got = session.translate_or_enroll("Save game", "MainMenu", "button", "");
        assert_eq!(got.as_deref(), Some("セーブ"));
        let stats = session.take_session_stats();
        assert_eq!(stats.replaced, 1);
        assert_eq!(stats.collected, 0);
    }

    #[test]
    fn test_numbered_string_goes_through_shape_table() {
        let dir = tempdir().unwrap();
        write_dict(dir.path(), "HP: #/#\tHP：#/#\n");
        let session = session_in(dir.path());

        let got = session.translate_or_enroll("HP: 12/80", "HUD", "label", "");
        assert_eq!(got.as_deref(), Some("HP：12/80"));
    }

    #[test]
    fn test_translation_newlines_are_reified() {
        let dir = tempdir().unwrap();
        write_dict(dir.path(), "First line \\nsecond line\t一行目/n二行目\n");
        let session = session_in(dir.path());

        let got = session.translate_or_enroll("First line\nsecond line", "", "", "");
        assert_eq!(got.as_deref(), Some("一行目\n二行目"));
    }

    #[test]
    fn test_miss_enrolls_once_per_window() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());

        assert!(
            session
                .translate_or_enroll("Open inventory", "MainMenu", "button", "")
                .is_none()
        );
        assert!(
            session
                .translate_or_enroll("Open inventory", "MainMenu", "button", "")
                .is_none()
        );

        let stats = session.take_session_stats();
        assert_eq!(stats.collected, 1);

        let texts = fs::read_to_string(
            dir.path()
                .join("Export")
                .join("PerContext")
                .join("MainMenu")
                .join("texts_en.txt"),
        )
        .unwrap();
        assert_eq!(texts, "Open inventory\n");
        assert_eq!(session.provenance_len(), 1);
    }

    #[test]
    fn test_enrolled_number_strings_are_stored_as_shapes() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());

        session.translate_or_enroll("Deal 7 damage", "Combat", "label", "");
        let texts = fs::read_to_string(
            dir.path()
                .join("Export")
                .join("PerContext")
                .join("Combat")
                .join("texts_en.txt"),
        )
        .unwrap();
        assert_eq!(texts, "Deal # damage\n");
    }

    #[test]
    fn test_denied_context_is_skipped_and_counted() {
        let dir = tempdir().unwrap();
        let mut cfg = SessionConfig::for_root(dir.path());
        cfg.aggregate_debounce_ms = 0;
        cfg.denied_contexts = vec!["HUD".to_string()];
        let session = Session::new(cfg).unwrap();

        assert!(session.translate_or_enroll("HP bar", "HUD", "", "").is_none());
        assert_eq!(session.excluded_contexts(), 1);
        assert_eq!(session.take_session_stats().collected, 0);
    }

    #[test]
    fn test_self_context_is_skipped_silently() {
        let dir = tempdir().unwrap();
        let mut cfg = SessionConfig::for_root(dir.path());
        cfg.aggregate_debounce_ms = 0;
        cfg.self_contexts = vec!["UilexSettings".to_string()];
        let session = Session::new(cfg).unwrap();

        assert!(
            session
                .translate_or_enroll("Pause aggregate", "uilexsettings", "", "")
                .is_none()
        );
        assert_eq!(session.excluded_contexts(), 0);
        assert_eq!(session.take_session_stats().collected, 0);
    }

    #[test]
    fn test_noise_is_not_enrolled() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());

        assert!(session.translate_or_enroll("12345", "HUD", "", "").is_none());
        assert!(session.translate_or_enroll("https://example.com", "HUD", "", "").is_none());
        assert_eq!(session.take_session_stats().collected, 0);
        assert!(!dir.path().join("Export").join("PerContext").exists());
    }

    #[test]
    fn test_tooltip_fallback_stitches_known_lines() {
        let dir = tempdir().unwrap();
        write_dict(dir.path(), "Damage\tダメージ\n");
        let session = session_in(dir.path());

        let got = session.translate_or_enroll(
            "Damage\n5 armor penetration",
            "Combat",
            "TooltipHandler",
            "",
        );
        assert_eq!(got.as_deref(), Some("ダメージ\n5 armor penetration"));
        let stats = session.take_session_stats();
        assert_eq!(stats.replaced, 1);
        // the untranslated line is not enrolled from inside a tooltip body
        assert_eq!(stats.collected, 0);
    }

    #[test]
    fn test_tooltip_fallback_needs_the_hint() {
        let dir = tempdir().unwrap();
        write_dict(dir.path(), "Damage\tダメージ\n");
        let session = session_in(dir.path());

        let got = session.translate_or_enroll("Damage\n5 armor penetration", "Combat", "label", "");
        assert!(got.is_none());
        // the whole body enrolled as one multi-line shape instead
        assert_eq!(session.take_session_stats().collected, 1);
    }

    #[test]
    fn test_inline_flush_writes_aggregate_and_index() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());

        session.translate_or_enroll("Open inventory", "MainMenu", "button", "");
        let export = dir.path().join("Export");
        let aggregate =
            fs::read_to_string(export.join("_All").join("texts_en_aggregate.txt")).unwrap();
        assert_eq!(aggregate, "Open inventory\n");

        let index =
            fs::read_to_string(export.join("Index").join("en_provenance.tsv")).unwrap();
        assert!(index.lines().any(|l| l.starts_with("Open inventory\t")));
    }

    #[test]
    fn test_take_session_stats_folds_into_totals() {
        let dir = tempdir().unwrap();
        write_dict(dir.path(), "Save game\tセーブ\n");
        let session = session_in(dir.path());

        session.translate_or_enroll("Save game", "", "", "");
        session.translate_or_enroll("Open inventory", "MainMenu", "", "");

        let taken = session.take_session_stats();
        assert_eq!(taken, SessionStats { replaced: 1, collected: 1, io_errors: 0 });
        assert_eq!(session.take_session_stats(), SessionStats::default());
        assert_eq!(
            session.totals(),
            SessionStats { replaced: 1, collected: 1, io_errors: 0 }
        );
    }

    #[test]
    fn test_clear_session_caches_allows_recollection() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());

        session.translate_or_enroll("Open inventory", "MainMenu", "", "");
        assert_eq!(session.clear_session_caches(), (1, 1));
        session.translate_or_enroll("Open inventory", "MainMenu", "", "");

        assert_eq!(session.take_session_stats().collected, 2);
        let index = fs::read_to_string(
            dir.path().join("Export").join("Index").join("en_provenance.tsv"),
        )
        .unwrap();
        let row = index
            .lines()
            .find(|l| l.starts_with("Open inventory\t"))
            .unwrap();
        assert!(row.ends_with("\t2"));
    }

    #[test]
    fn test_reload_picks_up_new_entries() {
        let dir = tempdir().unwrap();
        write_dict(dir.path(), "Save game\tセーブ\n");
        let session = session_in(dir.path());
        assert_eq!(session.dictionary_len(), 1);

        write_dict(dir.path(), "Save game\tセーブ\nQuit\t終了\n");
        let stats = session.reload_dictionary();
        assert_eq!(stats.exact, 2);
        assert_eq!(
            session.translate_or_enroll("Quit", "", "", "").as_deref(),
            Some("終了")
        );
    }

    #[test]
    fn test_rebuild_and_template_flow() {
        let dir = tempdir().unwrap();
        write_dict(dir.path(), "Save game\tセーブ\n");
        let session = session_in(dir.path());

        session.translate_or_enroll("Open inventory", "MainMenu", "", "");
        session.translate_or_enroll("Deal 7 damage", "Combat", "", "");

        let summary = session.rebuild().unwrap();
        assert_eq!(summary.aggregate_lines, 2);
        assert_eq!(summary.untranslated_lines, 2);
        assert_eq!(summary.context_sections, 2);

        let (path, rows) = session.write_template().unwrap();
        assert_eq!(rows, 2);
        let template = fs::read_to_string(&path).unwrap();
        assert!(template.contains("Open inventory\t\n"));
        assert!(template.contains("Deal # damage\t\n"));

        let (entries, contexts) = session.rebuild_provenance().unwrap();
        assert_eq!(entries, 2);
        assert_eq!(contexts, 2);
    }

    #[test]
    fn test_pause_aggregate_keeps_collecting() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());
        session.set_pause_aggregate(true);
        assert!(session.is_aggregate_paused());

        session.translate_or_enroll("Open inventory", "MainMenu", "", "");
        assert_eq!(session.take_session_stats().collected, 1);
        assert!(!dir.path().join("Export").join("_All").exists());

        session.set_pause_aggregate(false);
        session.translate_or_enroll("Quit", "MainMenu", "", "");
        let aggregate = fs::read_to_string(
            dir.path().join("Export").join("_All").join("texts_en_aggregate.txt"),
        )
        .unwrap();
        assert_eq!(aggregate, "Quit\n");
    }
}
