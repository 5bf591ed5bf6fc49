/// Shape derivation for numeric-templated dictionary entries
///
/// Many UI strings differ only in an embedded number ("HP: 10/20",
/// "HP: 3/20", ...). Shaping replaces each maximal digit run with a single
/// placeholder character and keeps the removed runs in order, so one
/// dictionary entry per shape covers every numeric variant and the concrete
/// numbers can be substituted back into the translated template.
///
/// Format: the placeholder is '#'. "HP: 10/20" shapes to "HP: #/#" with
/// numbers ["10", "20"].
use std::sync::LazyLock;

use regex::Regex;

/// Placeholder character standing in for a digit run inside a shape
pub const PLACEHOLDER: char = '#';

static RX_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// A canonical key with its digit runs lifted out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeParts {
    /// The key with each maximal digit run replaced by [`PLACEHOLDER`]
    pub shape: String,
    /// The removed digit runs, in left-to-right encounter order
    pub numbers: Vec<String>,
}

/// Derive the shape of a canonical key
///
/// A digit run is one or more digits with at most one embedded decimal
/// point ("10", "1.5"). The function is pure: the same key always yields
/// the same shape and the same ordered number list.
///
/// # Arguments
/// * `key` - A canonical key
///
/// # Returns
/// The shape and the digit runs it absorbed
///
/// # Example
/// ```ignore
/// let parts = make_shape("HP: 10/20");
/// assert_eq!(parts.shape, "HP: #/#");
/// assert_eq!(parts.numbers, vec!["10", "20"]);
/// ```
pub fn make_shape(key: &str) -> ShapeParts {
    let mut numbers = Vec::new();
    let shape = RX_NUMBER
        .replace_all(key, |caps: &regex::Captures<'_>| {
            numbers.push(caps[0].to_string());
            PLACEHOLDER.to_string()
        })
        .into_owned();
    ShapeParts { shape, numbers }
}

/// Substitute captured numbers back into a translated template
///
/// Walks the template left to right and replaces the i-th placeholder with
/// the i-th captured number. A placeholder beyond the available numbers is
/// left as a literal placeholder character; surplus numbers are ignored.
///
/// # Arguments
/// * `template` - A translation template containing placeholder characters
/// * `numbers` - The digit runs captured by [`make_shape`], in order
///
/// # Returns
/// The template with numbers substituted in
///
/// # Example
/// ```ignore
/// let parts = make_shape("HP: 10/20");
/// assert_eq!(fill_template("HP：#/#", &parts.numbers), "HP：10/20");
/// ```
pub fn fill_template(template: &str, numbers: &[String]) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut next = 0;
    for ch in template.chars() {
        if ch == PLACEHOLDER {
            match numbers.get(next) {
                Some(n) => out.push_str(n),
                None => out.push(PLACEHOLDER),
            }
            next += 1;
        } else {
            out.push(ch);
        }
    }
    out
}
