/// Export tree writer
///
/// Everything the collector learns lands under one export root:
///
/// ```text
/// Export/
///   PerContext/<context>/texts_en.txt     collected shapes, one per line
///   PerContext/<context>/strings_en.tsv   timestamped rows with header
///   Current/...                           same pair when grouping is off
///   _All/texts_en_aggregate.txt           coalesced shape list
///   _All/untranslated.txt                 shapes absent from the dictionary
///   _All/grouped_by_context.txt           shapes per context, sectioned
/// ```
///
/// Per-context files are append-only and written at enrollment time. The
/// aggregate buffers lines in memory and is flushed as one atomic
/// replacement, so a crash can lose at most the buffered tail and never
/// truncates the file. The `_All` listings are derived data; `rebuild`
/// regenerates all three from the per-context files alone.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::atomic;
use crate::canonical;
use crate::config::SessionConfig;
use crate::dictionary::DictionaryStore;
use crate::error::{UilexError, UilexResult};
use crate::shape;
use crate::util;

/// Per-context plain-text line file
pub const TEXTS_FILE: &str = "texts_en.txt";
/// Per-context timestamped row file
pub const ROWS_FILE: &str = "strings_en.tsv";
pub(crate) const ROWS_HEADER: &str = "timestamp_utc\tcontext\tsource\tscope\ttext";
/// Coalesced shape list under `_All`
pub const AGGREGATE_FILE: &str = "texts_en_aggregate.txt";
/// Shapes missing from the dictionary, under `_All`
pub const UNTRANSLATED_FILE: &str = "untranslated.txt";
/// Per-context sectioned listing under `_All`
pub const GROUPED_FILE: &str = "grouped_by_context.txt";
/// Directory for exports outside any context grouping
pub const CURRENT_DIR: &str = "Current";

/// One parsed line of a `strings_en.tsv` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    /// `None` when the timestamp column does not parse
    pub timestamp: Option<DateTime<Utc>>,
    pub context: String,
    pub source: String,
    pub scope: String,
    pub text: String,
}

/// Parse one row; `None` for lines with too few columns.
pub(crate) fn parse_row(line: &str) -> Option<ExportRow> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 5 {
        return None;
    }
    Some(ExportRow {
        timestamp: util::parse_iso_utc(cols[0]),
        context: cols[1].to_string(),
        source: cols[2].to_string(),
        scope: cols[3].to_string(),
        text: cols[4].to_string(),
    })
}

/// Read every data row of a row file, skipping the header, comments and
/// malformed lines.
pub(crate) fn read_rows(path: &Path) -> UilexResult<Vec<ExportRow>> {
    let bytes = fs::read(path).map_err(|err| UilexError::io(path, err))?;
    let text = String::from_utf8_lossy(&bytes);
    let mut rows = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() || line.starts_with('#') || line == ROWS_HEADER {
            continue;
        }
        if let Some(row) = parse_row(line) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// The directories holding per-context exports, sorted by name with the
/// ungrouped `Current` directory last.
pub(crate) fn export_dirs(
    export_root: &Path,
    per_context_subdir: &str,
) -> UilexResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let grouped = export_root.join(per_context_subdir);
    if grouped.is_dir() {
        let entries = fs::read_dir(&grouped).map_err(|err| UilexError::io(&grouped, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| UilexError::io(&grouped, err))?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
    }
    dirs.sort();
    let current = export_root.join(CURRENT_DIR);
    if current.is_dir() {
        dirs.push(current);
    }
    Ok(dirs)
}

/// Replace path separators and other characters unusable in a directory
/// name. An empty context still needs somewhere to live, hence the
/// underscore fallback.
pub(crate) fn sanitize_dir_component(context: &str) -> String {
    let cleaned: String = context
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Totals from one rebuild of the `_All` listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Distinct shapes in the regenerated aggregate
    pub aggregate_lines: usize,
    /// Shapes with no dictionary entry
    pub untranslated_lines: usize,
    /// Contexts with at least one shape
    pub context_sections: usize,
}

/// Writer for the export tree
pub struct ExportSink {
    config: SessionConfig,
    agg_pending: Mutex<Vec<String>>,
    paused: AtomicBool,
    // serializes all file writes; readers of finished files need no lock
    write_gate: Mutex<()>,
}

impl ExportSink {
    pub fn new(config: &SessionConfig) -> Self {
        ExportSink {
            paused: AtomicBool::new(config.pause_aggregate),
            config: config.clone(),
            agg_pending: Mutex::new(Vec::new()),
            write_gate: Mutex::new(()),
        }
    }

    /// Append one enrolled shape to the per-context files
    ///
    /// Which files are touched follows the configured export mode. The
    /// row file gets its header on first use. Strings with an empty
    /// context land in the ungrouped `Current` directory even when
    /// per-context splitting is on.
    pub fn record(
        &self,
        context: &str,
        source: &str,
        scope: &str,
        shape_line: &str,
        at: DateTime<Utc>,
    ) -> UilexResult<()> {
        let dir = self.context_dir(context);
        let _gate = self.write_gate.lock().unwrap();
        if self.config.export_mode.writes_text() {
            atomic::append_line(&dir.join(TEXTS_FILE), shape_line)?;
        }
        if self.config.export_mode.writes_rows() {
            let rows_path = dir.join(ROWS_FILE);
            if !rows_path.is_file() {
                atomic::write_atomic(&rows_path, format!("{ROWS_HEADER}\n").as_bytes())?;
            }
            let row = format!(
                "{}\t{}\t{}\t{}\t{}",
                util::iso_utc(at),
                canonical::sanitize_field(context),
                canonical::sanitize_field(source),
                canonical::sanitize_field(scope),
                shape_line
            );
            atomic::append_line(&rows_path, &row)?;
        }
        Ok(())
    }

    /// Queue a shape for the aggregate file. Returns whether it was
    /// queued; the aggregate being disabled or paused drops the line.
    pub fn enqueue_aggregate(&self, shape_line: &str) -> bool {
        if !self.config.emit_aggregate || self.paused.load(Ordering::Relaxed) {
            return false;
        }
        self.agg_pending
            .lock()
            .unwrap()
            .push(shape_line.to_string());
        true
    }

    /// Write queued aggregate lines out as one atomic file replacement
    ///
    /// The existing file content is kept and the queued lines appended
    /// after it. On a write failure the drained lines go back to the
    /// front of the queue so nothing is lost. Returns how many lines
    /// were written.
    pub fn flush_aggregate(&self) -> UilexResult<usize> {
        let mut drained = {
            let mut pending = self.agg_pending.lock().unwrap();
            if pending.is_empty() {
                return Ok(0);
            }
            std::mem::take(&mut *pending)
        };

        let _gate = self.write_gate.lock().unwrap();
        let path = self.config.all_dir().join(AGGREGATE_FILE);
        let mut content = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        };
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for line in &drained {
            content.push_str(line);
            content.push('\n');
        }

        if let Err(err) = atomic::write_atomic(&path, content.as_bytes()) {
            warn!(path = %path.display(), error = %err, "aggregate flush failed, lines requeued");
            let mut pending = self.agg_pending.lock().unwrap();
            drained.extend(pending.drain(..));
            *pending = drained;
            return Err(err);
        }
        Ok(drained.len())
    }

    /// Lines currently queued for the aggregate
    pub fn pending_aggregate(&self) -> usize {
        self.agg_pending.lock().unwrap().len()
    }

    /// Stop or resume aggregate queueing. Collection itself continues.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Regenerate the `_All` listings from the per-context files
    ///
    /// Scans every context directory in sorted order, keeping the first
    /// sighting of each shape for the aggregate and checking each unique
    /// shape against the dictionary for the untranslated list. Row files
    /// are preferred over text lists; the context column of a row wins
    /// over the directory name. Each output starts with a
    /// `# rebuilt_at=` stamp.
    pub fn rebuild(&self, dict: &DictionaryStore) -> UilexResult<RebuildSummary> {
        let mut aggregate: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for dir in export_dirs(&self.config.export_root, &self.config.per_context_subdir)? {
            let dirname = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let rows_path = dir.join(ROWS_FILE);
            let texts_path = dir.join(TEXTS_FILE);
            if rows_path.is_file() {
                for row in read_rows(&rows_path)? {
                    if row.text.is_empty() {
                        continue;
                    }
                    let context = if row.context.is_empty() {
                        dirname.clone()
                    } else {
                        row.context
                    };
                    if seen.insert(row.text.clone()) {
                        aggregate.push(row.text.clone());
                    }
                    grouped.entry(context).or_default().insert(row.text);
                }
            } else if texts_path.is_file() {
                let bytes =
                    fs::read(&texts_path).map_err(|err| UilexError::io(&texts_path, err))?;
                for line in String::from_utf8_lossy(&bytes).lines() {
                    if line.trim().is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if seen.insert(line.to_string()) {
                        aggregate.push(line.to_string());
                    }
                    grouped
                        .entry(dirname.clone())
                        .or_default()
                        .insert(line.to_string());
                }
            }
        }

        let untranslated: Vec<&String> = aggregate
            .iter()
            .filter(|line| {
                let parts = shape::make_shape(line);
                !dict.is_known(line, &parts.shape)
            })
            .collect();

        let stamp = format!("# rebuilt_at={}", util::iso_utc(Utc::now()));
        let all_dir = self.config.all_dir();

        let mut agg_out = String::new();
        agg_out.push_str(&stamp);
        agg_out.push('\n');
        for line in &aggregate {
            agg_out.push_str(line);
            agg_out.push('\n');
        }

        let mut missing_out = String::new();
        missing_out.push_str(&stamp);
        missing_out.push('\n');
        for line in &untranslated {
            missing_out.push_str(line);
            missing_out.push('\n');
        }

        let mut grouped_out = String::new();
        grouped_out.push_str(&stamp);
        grouped_out.push('\n');
        for (context, shapes) in &grouped {
            grouped_out.push('\n');
            grouped_out.push_str(&format!("### {context}\n"));
            for shape_line in shapes {
                grouped_out.push_str(shape_line);
                grouped_out.push('\n');
            }
        }

        let summary = RebuildSummary {
            aggregate_lines: aggregate.len(),
            untranslated_lines: untranslated.len(),
            context_sections: grouped.len(),
        };

        let _gate = self.write_gate.lock().unwrap();
        atomic::write_atomic(&all_dir.join(AGGREGATE_FILE), agg_out.as_bytes())?;
        atomic::write_atomic(&all_dir.join(UNTRANSLATED_FILE), missing_out.as_bytes())?;
        atomic::write_atomic(&all_dir.join(GROUPED_FILE), grouped_out.as_bytes())?;
        info!(
            aggregate = summary.aggregate_lines,
            untranslated = summary.untranslated_lines,
            contexts = summary.context_sections,
            "export listings rebuilt"
        );
        Ok(summary)
    }

    /// Turn the untranslated listing into a dictionary template
    ///
    /// Each untranslated shape becomes a `text<TAB>` row with the
    /// translation column left empty, written next to the dictionary so
    /// a translator can fill it in and merge it. Requires a rebuild to
    /// have produced the untranslated listing first.
    pub fn write_template(&self) -> UilexResult<(PathBuf, usize)> {
        let source = self.config.all_dir().join(UNTRANSLATED_FILE);
        if !source.is_file() {
            return Err(UilexError::ExportWriteError(format!(
                "missing {}; rebuild exports first",
                source.display()
            )));
        }
        let bytes = fs::read(&source).map_err(|err| UilexError::io(&source, err))?;
        let mut out = String::new();
        let mut count = 0usize;
        for line in String::from_utf8_lossy(&bytes).lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            out.push_str(line);
            out.push('\t');
            out.push('\n');
            count += 1;
        }
        let path = self.config.template_path();
        let _gate = self.write_gate.lock().unwrap();
        atomic::write_atomic(&path, out.as_bytes())?;
        info!(path = %path.display(), rows = count, "dictionary template written");
        Ok((path, count))
    }

    fn context_dir(&self, context: &str) -> PathBuf {
        if !self.config.per_context || context.is_empty() {
            self.config.export_root.join(CURRENT_DIR)
        } else {
            self.config.context_dir(&sanitize_dir_component(context))
        }
    }
}
