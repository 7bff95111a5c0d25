use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
  static ref NON_WORD_REGEX: Regex = Regex::new(r"[^\w\s]").unwrap();
  static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

/// Turns free text into a lowercase, underscore-separated identifier.
///
/// Punctuation is dropped, surrounding whitespace trimmed, inner whitespace
/// runs collapsed to a single `_`. Used for CSV column labels and for the
/// output file name derived from a dataset title.
pub fn slugify(label: &str) -> String {
  let stripped = NON_WORD_REGEX.replace_all(label, "");
  let collapsed = WHITESPACE_REGEX.replace_all(stripped.trim(), "_");
  collapsed.to_ascii_lowercase()
}
