/// Allow/deny filtering of collection contexts
///
/// Every candidate string arrives tagged with a context name (the screen
/// or subsystem it came from). The filter decides whether that context
/// participates in collection: a non-empty allowlist admits only its
/// members, otherwise the denylist blocks its members. Matching is
/// case-insensitive and an empty context is never excluded.
///
/// Exclusions can be logged. A screen that redraws every frame would
/// repeat the same line hundreds of times, so consecutive exclusions of
/// one context inside a short window are counted instead of logged, and
/// the count is emitted as a summary when the run breaks. The exclusion
/// counter itself is exact; it ticks on every excluded call whether or
/// not a line was written.
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::util;

/// Window for coalescing repeated exclusion log lines, in milliseconds
pub(crate) const LOG_WINDOW_MS: i64 = 500;

#[derive(Default)]
struct LogState {
    last_context: String,
    suppressed: u64,
    last_log_ms: i64,
}

/// Context allow/deny filter with debounced exclusion logging
pub struct ContextFilter {
    allowed: HashSet<String>,
    denied: HashSet<String>,
    log_excluded: bool,
    excluded_count: AtomicU64,
    log_state: Mutex<LogState>,
}

impl ContextFilter {
    /// Build a filter from configured context lists. Entries are folded to
    /// lowercase once here so lookups are case-insensitive.
    pub fn new(allowed: &[String], denied: &[String], log_excluded: bool) -> Self {
        ContextFilter {
            allowed: allowed.iter().map(|c| c.to_lowercase()).collect(),
            denied: denied.iter().map(|c| c.to_lowercase()).collect(),
            log_excluded,
            excluded_count: AtomicU64::new(0),
            log_state: Mutex::new(LogState::default()),
        }
    }

    /// Whether `context` is excluded from collection, using the current
    /// wall clock for log coalescing.
    pub fn is_excluded(&self, context: &str) -> bool {
        self.is_excluded_at(context, util::now_ms())
    }

    /// Whether `context` is excluded from collection, with the clock
    /// passed in
    ///
    /// # Arguments
    /// * `context` - context tag of the candidate string, may be empty
    /// * `now_ms` - current time in epoch milliseconds
    pub fn is_excluded_at(&self, context: &str, now_ms: i64) -> bool {
        if context.is_empty() {
            return false;
        }
        let lower = context.to_lowercase();
        let excluded = if !self.allowed.is_empty() {
            !self.allowed.contains(&lower)
        } else {
            self.denied.contains(&lower)
        };
        if excluded {
            self.excluded_count.fetch_add(1, Ordering::Relaxed);
            if self.log_excluded {
                self.log_exclusion(context, now_ms);
            }
        }
        excluded
    }

    /// Total exclusions since construction. Cumulative, never reset.
    pub fn excluded_count(&self) -> u64 {
        self.excluded_count.load(Ordering::Relaxed)
    }

    fn log_exclusion(&self, context: &str, now_ms: i64) {
        let mut state = self.log_state.lock().unwrap();
        if state.last_context == context && now_ms - state.last_log_ms <= LOG_WINDOW_MS {
            state.suppressed += 1;
            return;
        }
        if state.suppressed > 0 {
            info!(
                context = %state.last_context,
                repeats = state.suppressed,
                "context exclusions coalesced"
            );
        }
        info!(context = %context, "context excluded from collection");
        state.last_context = context.to_string();
        state.suppressed = 0;
        state.last_log_ms = now_ms;
    }
}
