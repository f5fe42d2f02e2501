//! Bidirectional helpers between filesystem paths and `file://` URIs.
//!
//! Deliberately does not percent-encode. That's a known conformance gap
//! (see `SPEC_FULL.md` §9): it's wrong for paths containing spaces or
//! non-ASCII characters and some strict servers will reject such URIs, but
//! it keeps `uri_to_path(file_uri(p)) == p` exact, which several call sites
//! (the diagnostics map key, in particular) rely on.

use std::path::{Path, PathBuf};

/// Prefixes an absolute path with `file://`.
pub fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Strips a `file://` prefix, returning the path unchanged if absent.
pub fn uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_absolute_paths() {
        let p = PathBuf::from("/home/user/project/main.rs");
        assert_eq!(uri_to_path(&file_uri(&p)), p);
    }

    #[test]
    fn uri_to_path_passes_through_non_file_uris() {
        assert_eq!(uri_to_path("not-a-uri"), PathBuf::from("not-a-uri"));
    }
}
