//! Category path parsing.
//!
//! Paths are `/`-delimited. Empty segments, surrounding whitespace and
//! leading/trailing separators are dropped, so `" Tech//Rust/"` and
//! `"Tech/Rust"` name the same node. Nothing beyond that structure is checked.

use std::borrow::Cow;

/// Path separator between category segments.
pub const SEPARATOR: char = '/';

/// Iterate the non-empty, trimmed segments of a category path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

/// Canonical form of a category path, or `None` if it has no segments.
pub fn normalize_category(path: &str) -> Option<String> {
    let joined = segments(path).collect::<Vec<_>>().join("/");
    (!joined.is_empty()).then_some(joined)
}

/// First segment of a category path (the top-level group name).
pub fn top_segment(path: &str) -> Option<&str> {
    segments(path).next()
}

/// Name of the immediate child of `parent` on the way to `path`.
///
/// Returns `None` when `path` is not strictly inside `parent`.
///
/// ```
/// use feedshelf::categories::path::child_segment;
///
/// assert_eq!(child_segment("A/B/C", "A"), Some("B"));
/// assert_eq!(child_segment("A", "A"), None);
/// ```
pub fn child_segment<'a>(path: &'a str, parent: &str) -> Option<&'a str> {
    let mut path_segments = segments(path);
    for parent_segment in segments(parent) {
        if path_segments.next()? != parent_segment {
            return None;
        }
    }
    path_segments.next()
}

/// True when `path` lies strictly below `parent` (`parent + "/"` prefix).
pub fn is_within(path: &str, parent: &str) -> bool {
    child_segment(path, parent).is_some()
}

/// Join a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_owned()
    } else {
        format!("{parent}{SEPARATOR}{child}")
    }
}

/// Remove control characters from user-entered text (titles, paths).
///
/// Returns `Cow::Borrowed` when there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !c.is_control()).collect())
}

/// Clean a category typed by the user: strip control characters, then
/// normalize. Returns `None` for input that names no category.
pub fn sanitize_category(input: &str) -> Option<String> {
    normalize_category(&strip_control_chars(input))
}
