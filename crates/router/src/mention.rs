//! Name/alias detection.

/// Check whether the responder is addressed anywhere in `text`.
///
/// Aliases match case-insensitively as whole words: the characters on either
/// side of a hit must not be alphanumeric, so `"nubi,"` and `"@NUBI"` match
/// while `"nubious"` does not. Pure and side-effect-free.
#[must_use]
pub fn is_addressed(text: &str, aliases: &[String]) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    aliases
        .iter()
        .filter(|alias| !alias.is_empty())
        .any(|alias| contains_whole_word(&lower, &alias.to_lowercase()))
}

/// Substring search with non-alphanumeric boundaries on both sides.
///
/// Both arguments must already be lower-cased.
pub(crate) fn contains_whole_word(haystack: &str, needle: &str) -> bool {
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let at = from + offset;
        let end = at + needle.len();
        let boundary_before = haystack[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let boundary_after = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if boundary_before && boundary_after {
            return true;
        }
        // Advance past the first character of this hit; `find` guarantees a
        // char boundary at `at`.
        from = at
            + haystack[at..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}
