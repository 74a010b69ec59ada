//! Pure helpers for treating slash-delimited keys as a directory tree.

/// Parent directory of `key`, or an empty string for root-level keys.
///
/// Drops the last path component the way `dirname` does: `"a/b/"` gives
/// `"a/b"`, `"/x"` gives `"/"`.
pub fn directory_of(key: &str) -> String {
    let Some(idx) = key.rfind('/') else {
        return String::new();
    };
    let parent = key[..idx].trim_end_matches('/');
    if parent.is_empty() {
        if key.starts_with('/') {
            return "/".to_string();
        }
        return String::new();
    }
    parent.to_string()
}

/// `directory` followed by each of its ancestors, deepest first.
///
/// `"a/b/c"` yields `["a/b/c", "a/b", "a"]`; the empty path yields nothing.
pub fn ancestors_of(directory: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = directory.trim_end_matches('/').to_string();
    while !current.is_empty() && current != "/" {
        let parent = directory_of(&current);
        chain.push(current);
        current = parent;
    }
    chain
}

/// Markdown index files are structural: never listed or refreshed as photos.
pub fn is_index_file(key: &str) -> bool {
    key.to_ascii_lowercase().ends_with(".md")
}

/// Key of the markdown index file describing `prefix`.
pub fn index_key_for(prefix: &str) -> String {
    format!("{}/index.md", prefix.trim_end_matches('/'))
}
