//! Lexical normalization of caller-controlled path strings.
//!
//! Paths arrive from query parameters and from archive entry names, so they
//! are untrusted. Cleaning is purely lexical (there is no filesystem behind
//! the key-space, hence nothing to resolve symlinks against):
//!
//! - empty and `.` segments are dropped
//! - `..` removes the preceding segment; a `..` with nothing left to remove
//!   is discarded, so a path can never climb above the namespace root
//! - leading and repeated `/` disappear
//!
//! None of these functions fail. Input that cleans to nothing maps to the
//! empty string, which callers treat as "no sub-path".

/// Normalize a path into a leaf key suffix.
///
/// The result never starts or ends with `/` and never contains a `..`
/// segment. It may be empty.
///
/// ```
/// use blobgate_types::normalize_path;
///
/// assert_eq!(normalize_path("photos/./summer/img.jpg"), "photos/summer/img.jpg");
/// assert_eq!(normalize_path("../../etc/passwd"), "etc/passwd");
/// assert_eq!(normalize_path("/"), "");
/// ```
pub fn normalize_path(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Normalize a path into a key prefix.
///
/// Same cleaning as [`normalize_path`], followed by exactly one trailing
/// `/` when the result is non-empty.
///
/// ```
/// use blobgate_types::normalize_prefix;
///
/// assert_eq!(normalize_prefix("my_backup"), "my_backup/");
/// assert_eq!(normalize_prefix("/my_backup//"), "my_backup/");
/// assert_eq!(normalize_prefix("."), "");
/// ```
pub fn normalize_prefix(raw: &str) -> String {
    let mut cleaned = normalize_path(raw);
    if !cleaned.is_empty() {
        cleaned.push('/');
    }
    cleaned
}

/// Final segment of a normalized path, or `None` if the path is empty.
pub fn file_name(raw: &str) -> Option<String> {
    normalize_path(raw)
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_paths_are_unchanged() {
        assert_eq!(normalize_path("a.txt"), "a.txt");
        assert_eq!(normalize_path("sub/b.txt"), "sub/b.txt");
    }

    #[test]
    fn dot_segments_collapse() {
        assert_eq!(normalize_path("./a/./b"), "a/b");
        assert_eq!(normalize_path("a/b/../c"), "a/c");
        assert_eq!(normalize_path("a//b///c"), "a/b/c");
    }

    #[test]
    fn traversal_is_clamped_at_root() {
        assert_eq!(normalize_path("../../etc/passwd"), "etc/passwd");
        assert_eq!(normalize_path("a/../../x"), "x");
        assert_eq!(normalize_path("/../x"), "x");
    }

    #[test]
    fn degenerate_inputs_map_to_empty() {
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("."), "");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(".."), "");
        assert_eq!(normalize_path("a/.."), "");
    }

    #[test]
    fn leading_slash_is_stripped() {
        assert_eq!(normalize_path("/abs/path.txt"), "abs/path.txt");
    }

    #[test]
    fn prefix_has_single_trailing_slash() {
        assert_eq!(normalize_prefix("photos"), "photos/");
        assert_eq!(normalize_prefix("photos/"), "photos/");
        assert_eq!(normalize_prefix("photos///"), "photos/");
        assert_eq!(normalize_prefix("../../x"), "x/");
    }

    #[test]
    fn empty_prefix_stays_empty() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("."), "");
    }

    #[test]
    fn file_name_takes_last_segment() {
        assert_eq!(file_name("a/b/c.txt").as_deref(), Some("c.txt"));
        assert_eq!(file_name("c.txt").as_deref(), Some("c.txt"));
        assert_eq!(file_name("dir/").as_deref(), Some("dir"));
        assert_eq!(file_name("/"), None);
    }

    proptest! {
        #[test]
        fn never_contains_parent_segment(raw in "[a-z./]{0,40}") {
            let cleaned = normalize_path(&raw);
            prop_assert!(cleaned.split('/').all(|s| s != ".."));
            prop_assert!(cleaned.split('/').all(|s| s != "."));
        }

        #[test]
        fn never_starts_or_ends_with_slash(raw in "[a-z./]{0,40}") {
            let cleaned = normalize_path(&raw);
            prop_assert!(!cleaned.starts_with('/'));
            prop_assert!(!cleaned.ends_with('/'));
            prop_assert!(!cleaned.contains("//"));
        }

        #[test]
        fn normalization_is_idempotent(raw in "[a-z./]{0,40}") {
            let once = normalize_path(&raw);
            prop_assert_eq!(normalize_path(&once), once.clone());
            let prefix = normalize_prefix(&raw);
            prop_assert_eq!(normalize_prefix(&prefix), prefix);
        }
    }
}
