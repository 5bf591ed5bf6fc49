/// Session configuration
///
/// The host constructs a [`SessionConfig`] once and hands it to
/// [`Session::new`](crate::Session::new). How the values reach this struct
/// (settings file, command line, hard-coded) is the host's business; the
/// serde derives are provided so it can be embedded in whatever settings
/// format the host already uses.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default noise exclusion pattern: blank lines, URLs, pure numbers, pure
/// punctuation/whitespace runs, and GUID-shaped strings.
pub const DEFAULT_EXCLUDE_PATTERNS: &str =
    r"^\s*$|^https?://|^[0-9]+$|^[-–—…\.\(\)\[\]\{\}/:+*,%<>→=~\s]+$|^[A-F0-9]{8}(-[A-F0-9]{4}){3}-[A-F0-9]{12}$";

/// Which per-context files an enrollment appends to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportMode {
    /// Only the plain-text line file (`texts_en.txt`)
    TextOnly,
    /// Only the tab-separated row file (`strings_en.tsv`)
    Full,
    /// Both files
    #[default]
    Both,
}

impl ExportMode {
    /// Whether this mode writes the plain-text line file
    pub fn writes_text(self) -> bool {
        matches!(self, ExportMode::TextOnly | ExportMode::Both)
    }

    /// Whether this mode writes the tab-separated row file
    pub fn writes_rows(self) -> bool {
        matches!(self, ExportMode::Full | ExportMode::Both)
    }
}

/// Everything a [`Session`](crate::Session) needs to know at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path of the tab-separated dictionary resource
    pub dictionary_path: PathBuf,
    /// Root directory all export outputs live under
    pub export_root: PathBuf,
    /// Split exports into one subdirectory per context; when off everything
    /// lands in a single `Current` directory
    pub per_context: bool,
    /// Name of the per-context subdirectory under the export root
    pub per_context_subdir: String,
    /// Which files each enrollment appends to
    pub export_mode: ExportMode,
    /// Maintain the coalesced aggregate file
    pub emit_aggregate: bool,
    /// Keep collecting but skip aggregate writes while set
    pub pause_aggregate: bool,
    /// Delay before a coalesced aggregate flush; zero flushes inline
    pub aggregate_debounce_ms: u64,
    /// Strings shorter than this are noise
    pub min_length: usize,
    /// Noise exclusion regular expression; an invalid pattern falls back to
    /// matching blank strings only
    pub exclude_patterns: String,
    /// Allow-list of context names; when non-empty, anything absent is
    /// excluded
    pub allowed_contexts: Vec<String>,
    /// Deny-list of context names
    pub denied_contexts: Vec<String>,
    /// The host's own configuration/debug surfaces; calls from these are
    /// skipped silently so the system never collects its own UI
    pub self_contexts: Vec<String>,
    /// Emit a log line when a context is excluded
    pub log_excluded_contexts: bool,
    /// Reload the dictionary when its file changes on disk
    pub watch_dictionary: bool,
    /// Where the provenance index is persisted; `None` means
    /// `<export_root>/Index/en_provenance.tsv`
    pub provenance_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            dictionary_path: PathBuf::new(),
            export_root: PathBuf::new(),
            per_context: true,
            per_context_subdir: "PerContext".to_string(),
            export_mode: ExportMode::Both,
            emit_aggregate: true,
            pause_aggregate: false,
            aggregate_debounce_ms: 250,
            min_length: 2,
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS.to_string(),
            allowed_contexts: Vec::new(),
            denied_contexts: Vec::new(),
            self_contexts: Vec::new(),
            log_excluded_contexts: true,
            watch_dictionary: false,
            provenance_path: None,
        }
    }
}

impl SessionConfig {
    /// Conventional layout under one root directory: the dictionary at
    /// `<root>/Dict/strings.tsv` and exports under `<root>/Export`.
    pub fn for_root(root: &Path) -> Self {
        SessionConfig {
            dictionary_path: root.join("Dict").join("strings.tsv"),
            export_root: root.join("Export"),
            ..SessionConfig::default()
        }
    }

    /// Directory per-context exports live in for a given sanitized context
    /// directory name; the single `Current` directory when per-context
    /// splitting is off.
    pub fn context_dir(&self, safe_context: &str) -> PathBuf {
        if self.per_context {
            self.export_root.join(&self.per_context_subdir).join(safe_context)
        } else {
            self.export_root.join(crate::exports::CURRENT_DIR)
        }
    }

    /// Directory the aggregate and rebuilt outputs live in
    pub fn all_dir(&self) -> PathBuf {
        self.export_root.join("_All")
    }

    /// The template scaffold lands next to the dictionary so a translator
    /// can fill it in and rename it over the dictionary file.
    pub fn template_path(&self) -> PathBuf {
        let dir = self
            .dictionary_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.export_root.clone());
        dir.join("strings_template.tsv")
    }

    /// Where the provenance index is persisted
    pub fn provenance_path(&self) -> PathBuf {
        match &self.provenance_path {
            Some(path) => path.clone(),
            None => self.export_root.join("Index").join("en_provenance.tsv"),
        }
    }
}
