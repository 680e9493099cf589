//! Filesystem-safe names for fetched documents

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref DISALLOWED: Regex = Regex::new(r"[^a-z0-9_\s-]").unwrap();
    static ref SEPARATORS: Regex = Regex::new(r"[-\s]+").unwrap();
}

/// Name used when a title slugifies to nothing
const FALLBACK_STEM: &str = "document";

/// Lowercase ASCII slug: alphanumerics, `_` and `-`, words joined by single hyphens.
///
/// Accented letters fold to their ASCII base (NFKD, then combining marks dropped);
/// anything with no ASCII decomposition is removed.
pub fn slugify(title: &str) -> String {
    let folded: String = title.nfkd().filter(char::is_ascii).collect();
    let lowered = folded.to_lowercase();
    let kept = DISALLOWED.replace_all(&lowered, "");
    let joined = SEPARATORS.replace_all(kept.trim(), "-");
    joined.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Filename for a replacement document.
///
/// An existing non-empty name is reused as-is; otherwise the title is slugified.
pub fn document_filename(existing: Option<&str>, title: &str) -> String {
    match existing {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            let slug = slugify(title);
            if slug.is_empty() {
                format!("{}.pdf", FALLBACK_STEM)
            } else {
                format!("{}.pdf", slug)
            }
        }
    }
}
