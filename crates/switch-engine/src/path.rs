//! Path normalization shared by rule insertion and request lookup.
//!
//! Rules and lookups go through the same [`normalize_path`] function so that
//! `"/Admin/"`, `"admin/"` and `"ADMIN"` all land on the same key.

use url::form_urlencoded;

/// Which kind of path is being normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// A configured file rule path.
    File,
    /// A configured directory rule path.
    Directory,
    /// An incoming request path, already decoded and relative to the
    /// application root.
    Request,
    /// A path handed to a rule lookup. Slashes are stripped like a rule
    /// path, but whitespace is part of the key.
    Lookup,
}

/// Normalize a path for storage or lookup.
///
/// * Rule paths are trimmed of surrounding whitespace; request and lookup
///   paths are not.
/// * Everything is lower-cased.
/// * A single leading `/` is removed.
/// * Rule and lookup paths also lose a single trailing `/`.
///
/// The application root normalizes to the empty string.
pub fn normalize_path(raw: &str, kind: PathKind) -> String {
    let raw = match kind {
        PathKind::File | PathKind::Directory => raw.trim(),
        PathKind::Request | PathKind::Lookup => raw,
    };
    let lowered = raw.to_lowercase();
    let path = lowered.strip_prefix('/').unwrap_or(&lowered);
    let path = match kind {
        PathKind::File | PathKind::Directory | PathKind::Lookup => {
            path.strip_suffix('/').unwrap_or(path)
        }
        PathKind::Request => path,
    };
    path.to_string()
}

/// Turn a raw request path into the normalized, application-relative form
/// used for file lookup.
///
/// The path is percent-decoded, the application root is removed, and the
/// result is normalized as a [`PathKind::Request`].
pub fn normalize_request_path(raw_path: &str, application_root: &str) -> String {
    let decoded = percent_decode(raw_path);
    let relative = strip_application_root(&decoded, application_root);
    normalize_path(relative, PathKind::Request)
}

/// The directory part of a normalized request path: everything before the
/// last `/`, or `""` when the path has no separator.
pub fn directory_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

/// The final segment of a path: everything after the last `/`.
pub fn final_segment(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Remove the application root prefix from `path`.
///
/// The comparison is ASCII case-insensitive and only happens on a segment
/// boundary: root `/app` strips `/app/admin` to `/admin` but leaves
/// `/application` alone. A root of `/` (or empty) leaves the path unchanged.
pub fn strip_application_root<'a>(path: &'a str, application_root: &str) -> &'a str {
    let root = application_root.trim_end_matches('/');
    if root.is_empty() || path.len() < root.len() || !path.is_char_boundary(root.len()) {
        return path;
    }

    let (head, rest) = path.split_at(root.len());
    if head.eq_ignore_ascii_case(root) && (rest.is_empty() || rest.starts_with('/')) {
        rest
    } else {
        path
    }
}

/// Decode `%XX` escapes and `+` (as a space) in a URL path.
///
/// Malformed escapes are kept literally and invalid UTF-8 is replaced with
/// U+FFFD, so decoding never fails.
pub fn percent_decode(raw: &str) -> String {
    // The form decoder splits on `&` and `=`; escape them so the whole path
    // comes back as a single key.
    let escaped = raw.replace('&', "%26").replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}
