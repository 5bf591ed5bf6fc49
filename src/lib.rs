/// uilex: runtime UI-string translation lookup and collection
///
/// The crate sits between a host application's UI layer and a
/// tab-separated dictionary maintained by translators. Every string the
/// UI is about to draw goes through one call:
///
/// 1. **Canonicalize** - newline spellings and whitespace runs collapse
///    to one canonical form, so cosmetically different renderings of the
///    same text share one dictionary key.
/// 2. **Look up** - an exact-match table answers first; a shape table
///    (numbers abstracted to `#`) answers for numbered variants and the
///    concrete numbers are substituted back into the translation.
/// 3. **Collect** - on a miss, noise filtering drops junk (numeric
///    readouts, URLs, already-translated text, churning counters) and
///    everything else is enrolled into an export tree for translators,
///    with a provenance index recording where each string was seen.
///
/// # Example
///
/// ```ignore
/// use uilex::{Session, SessionConfig};
///
/// let config = SessionConfig::for_root(std::path::Path::new("./Lex"));
/// let session = Session::new(config)?;
///
/// // on the UI path
/// let shown = session
///     .translate_or_enroll("HP: 12/80", "HUD", "label", "")
///     .unwrap_or_else(|| "HP: 12/80".to_string());
///
/// // at shutdown
/// session.flush(true)?;
/// ```
pub mod atomic;
pub mod canonical;
pub mod config;
pub mod context;
pub mod debounce;
pub mod dictionary;
pub mod error;
pub mod exports;
pub mod noise;
pub mod pipeline;
pub mod provenance;
pub mod shape;
pub mod watch;

mod util;

#[cfg(test)]
mod integration_tests;

pub use canonical::{NEWLINE_TOKEN, canonicalize, reify, sanitize_field};
pub use config::{ExportMode, SessionConfig};
pub use dictionary::{DictionaryStore, LoadStats};
pub use error::{UilexError, UilexResult};
pub use exports::{ExportSink, RebuildSummary};
pub use noise::NoiseClassifier;
pub use pipeline::{Session, SessionStats};
pub use provenance::{ProvenanceEntry, ProvenanceStore};
pub use shape::{PLACEHOLDER, ShapeParts, fill_template, make_shape};
pub use watch::DictWatcher;
