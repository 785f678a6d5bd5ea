//! Bracket-notation query keys (`key[sub][sub2]`).

/// Split a bracket-notation key into its base and nested segments.
///
/// `tableFilters[filter_1][value]` splits into `tableFilters` and
/// `["filter_1", "value"]`; a plain key splits into itself and no segments.
/// Returns `None` for malformed keys (unbalanced or empty brackets, text
/// after a closing bracket).
pub fn split_key(key: &str) -> Option<(&str, Vec<&str>)> {
    let Some(open) = key.find('[') else {
        if key.contains(']') || key.is_empty() {
            return None;
        }
        return Some((key, Vec::new()));
    };

    let base = &key[..open];
    if base.is_empty() || base.contains(']') {
        return None;
    }

    Some((base, groups(&key[open..])?))
}

/// Nested segments of `key` below `base`.
///
/// `segments_under("filters[a][b]", "filters")` yields `["a", "b"]`, and
/// `key == base` yields no segments. Returns `None` if `key` is not under
/// `base` or the remainder is malformed.
pub fn segments_under<'a>(key: &'a str, base: &str) -> Option<Vec<&'a str>> {
    groups(key.strip_prefix(base)?)
}

fn groups(mut rest: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        let segment = &inner[..close];
        if segment.is_empty() || segment.contains('[') {
            return None;
        }
        segments.push(segment);
        rest = &inner[close + 1..];
    }
    Some(segments)
}

/// Join a base key and nested segments into bracket notation.
pub fn join_key<S: AsRef<str>>(base: &str, segments: &[S]) -> String {
    let mut key = String::from(base);
    for segment in segments {
        key.push('[');
        key.push_str(segment.as_ref());
        key.push(']');
    }
    key
}

/// Check whether `key` is `base` itself or nested beneath it.
pub fn is_under(key: &str, base: &str) -> bool {
    match key.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest.starts_with('['),
        None => false,
    }
}
