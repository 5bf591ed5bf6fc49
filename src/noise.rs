/// Noise classification for candidate strings
///
/// Strings reaching the collector are a mix of real UI text and junk:
/// numeric readouts, URLs, identifiers, text already in the target
/// language, and per-frame counters that churn through thousands of
/// variants. The classifier applies a fixed rule ladder and reports
/// whether a string should be dropped instead of enrolled.
///
/// Rules run in order: blank, too short, exclusion patterns, mostly
/// numeric, CJK-heavy, and finally the dynamic-churn detector. The
/// dynamic detector only sees strings that contain numbers; it counts
/// repeats of the same shape inside a short window and mutes the shape
/// for a few seconds once it churns too fast.
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::config::DEFAULT_EXCLUDE_PATTERNS;
use crate::shape::ShapeParts;
use crate::util;

/// Repeat window for the dynamic-churn detector, in milliseconds
pub(crate) const DYN_WINDOW_MS: i64 = 800;
/// Repeats of one shape inside the window before it is muted
pub(crate) const DYN_THRESHOLD: u32 = 3;
/// How long a muted shape stays muted, in milliseconds
pub(crate) const DYN_MUTE_MS: i64 = 3000;

static RX_MOSTLY_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d.,+\-:%/()\s＝=→<>％]+$").unwrap());
static RX_CJK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Han}\p{Hiragana}\p{Katakana}]").unwrap());

#[derive(Debug, Clone, Copy)]
struct DynState {
    count: u32,
    window_start_ms: i64,
    muted_until_ms: i64,
}

/// Stateful classifier; one instance per session
pub struct NoiseClassifier {
    min_length: usize,
    exclude: Regex,
    dynamic: HashMap<String, DynState>,
}

impl NoiseClassifier {
    /// Build a classifier from the configured minimum length and exclusion
    /// pattern. An empty pattern falls back to the built-in defaults, and a
    /// pattern that fails to compile degrades to matching blank lines only.
    pub fn new(min_length: usize, exclude_pattern: &str) -> Self {
        let source = if exclude_pattern.trim().is_empty() {
            DEFAULT_EXCLUDE_PATTERNS
        } else {
            exclude_pattern
        };
        let exclude = match Regex::new(source) {
            Ok(rx) => rx,
            Err(err) => {
                warn!(error = %err, "exclude pattern invalid, matching blank lines only");
                Regex::new(r"^\s*$").unwrap()
            }
        };
        NoiseClassifier {
            min_length,
            exclude,
            dynamic: HashMap::new(),
        }
    }

    /// Classify `text` using the current wall clock.
    pub fn is_noise(&mut self, text: &str, parts: &ShapeParts) -> bool {
        self.is_noise_at(text, parts, util::now_ms())
    }

    /// Classify `text`, with the clock passed in
    ///
    /// `parts` must be the shape of the canonical form of `text`; the
    /// dynamic detector keys its repeat counting on `parts.shape`.
    pub fn is_noise_at(&mut self, text: &str, parts: &ShapeParts, now_ms: i64) -> bool {
        if text.trim().is_empty() {
            return true;
        }
        if text.chars().count() < self.min_length {
            return true;
        }
        if self.exclude.is_match(text) {
            return true;
        }
        if RX_MOSTLY_NUMERIC.is_match(text) {
            return true;
        }
        if cjk_heavy(text) {
            return true;
        }
        if !parts.numbers.is_empty() && self.is_dynamic_noise(&parts.shape, now_ms) {
            return true;
        }
        false
    }

    /// Drop all accumulated repeat counts and mutes.
    pub fn clear_dynamic(&mut self) {
        self.dynamic.clear();
    }

    fn is_dynamic_noise(&mut self, shape_key: &str, now_ms: i64) -> bool {
        match self.dynamic.get_mut(shape_key) {
            Some(state) => {
                if now_ms < state.muted_until_ms {
                    return true;
                }
                if now_ms - state.window_start_ms <= DYN_WINDOW_MS {
                    state.count += 1;
                    if state.count >= DYN_THRESHOLD {
                        state.muted_until_ms = now_ms + DYN_MUTE_MS;
                        return true;
                    }
                    false
                } else {
                    state.count = 1;
                    state.window_start_ms = now_ms;
                    false
                }
            }
            None => {
                self.dynamic.insert(
                    shape_key.to_string(),
                    DynState {
                        count: 1,
                        window_start_ms: now_ms,
                        muted_until_ms: 0,
                    },
                );
                false
            }
        }
    }
}

/// Ratio test: at least 30% of the non-control characters are Han,
/// Hiragana or Katakana. Such strings are already in the target language.
fn cjk_heavy(text: &str) -> bool {
    let total = text.chars().filter(|c| !c.is_control()).count();
    if total == 0 {
        return false;
    }
    let cjk = RX_CJK.find_iter(text).count();
    cjk * 100 / total >= 30
}
