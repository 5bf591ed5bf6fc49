/// Text canonicalization for dictionary keys
///
/// Raw UI strings arrive with inconsistent newline spellings ("\r\n", a literal
/// backslash-n escape, or the loose "/ n" marker some authors type) and ragged
/// whitespace. Canonicalization folds all of these into one stable form so the
/// same visible text always produces the same lookup key, and so a key fits on
/// a single line of a text export.
///
/// Inside a canonical key a newline is the two-character token "/n", never a
/// control character. `reify` maps the token back to a real newline for text
/// that is about to be displayed.
use std::sync::LazyLock;

use regex::Regex;

/// Two-character token standing in for a newline inside a canonical key
pub const NEWLINE_TOKEN: &str = "/n";

static RX_SLASH_N: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/\s*n").unwrap());

/// Canonicalize a raw UI string into a stable lookup key
///
/// The result contains no "\r", no control newline, and no runs of whitespace:
/// every newline spelling becomes the "/n" token, other whitespace runs
/// collapse to a single space, a space immediately before a newline is
/// dropped, and the ends are trimmed. Canonicalization is idempotent.
///
/// # Arguments
/// * `raw` - The string as observed in the UI path
///
/// # Returns
/// The canonical key; empty input comes back unchanged
///
/// # Example
/// ```ignore
/// assert_eq!(canonicalize("  Hello,\r\n  world!  "), "Hello,/n world!");
/// assert_eq!(canonicalize("one \\n two"), "one/n two");
/// ```
pub fn canonicalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    // Step 1: unify every newline spelling into a real '\n'
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n").replace("\\n", "\n");
    let unified = RX_SLASH_N.replace_all(&unified, "\n");

    // Step 2: collapse whitespace and emit newlines as the printable token
    let mut out = String::with_capacity(unified.len());
    let mut pending_space = false;
    for ch in unified.chars() {
        if ch == '\n' {
            // a space directly before a newline carries no information
            pending_space = false;
            out.push_str(NEWLINE_TOKEN);
        } else if ch.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        }
    }
    out
}

/// Turn the newline tokens of a canonical key (or a translation looked up by
/// one) back into real newlines for display.
pub fn reify(text: &str) -> String {
    text.replace(NEWLINE_TOKEN, "\n")
}

/// Unify the newline spellings of a translation value into token form
/// without touching its spacing. Translations are display text; collapsing
/// their whitespace is not ours to do.
pub(crate) fn tokenize_newlines(s: &str) -> String {
    let unified = s.replace("\r\n", "\n").replace('\r', "\n").replace("\\n", "\n");
    RX_SLASH_N.replace_all(&unified, "\n").replace('\n', NEWLINE_TOKEN)
}

/// Make a free-text field safe to embed in a tab-separated row
///
/// Tabs and carriage returns become spaces and embedded newlines become the
/// "/n" token, so one logical record always occupies exactly one line.
pub fn sanitize_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\t' => out.push(' '),
            '\r' => out.push(' '),
            '\n' => out.push_str(NEWLINE_TOKEN),
            _ => out.push(ch),
        }
    }
    out
}
