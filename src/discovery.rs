//! Language-to-server resolution and workspace-root discovery. External
//! collaborators to the core: `lsp::client` never imports this module.

use std::path::{Path, PathBuf};

/// Ordered lists of candidate server commands per LSP `languageId`. The
/// first candidate found on `PATH` wins; argv beyond index 0 are flags the
/// server needs to speak stdio-framed LSP at all (e.g. `--stdio`).
fn candidates(language_id: &str) -> &'static [&'static [&'static str]] {
    match language_id {
        "go" => &[&["gopls", "serve"]],
        "python" => &[&["pylsp"], &["pyright-langserver", "--stdio"]],
        "javascript" | "typescript" | "typescriptreact" | "javascriptreact" => {
            &[&["typescript-language-server", "--stdio"]]
        }
        "rust" => &[&["rust-analyzer"]],
        "c" | "cpp" => &[&["clangd"]],
        "java" => &[&["jdtls"]],
        "ruby" => &[&["solargraph", "stdio"]],
        "csharp" => &[&["OmniSharp", "--languageserver"]],
        "lua" => &[&["lua-language-server"]],
        _ => &[],
    }
}

/// Resolves the first candidate server for `language_id` whose executable
/// is found on `PATH`, returning its full argv. `None` if none are
/// installed or the language has no known server.
pub fn resolve_server(language_id: &str) -> Option<Vec<String>> {
    for candidate in candidates(language_id) {
        if which::which(candidate[0]).is_ok() {
            return Some(candidate.iter().map(|s| s.to_string()).collect());
        }
    }
    None
}

const ROOT_MARKERS: &[&str] = &[
    "Cargo.toml",
    "go.mod",
    "go.sum",
    "package.json",
    "pyproject.toml",
    "setup.py",
    ".git",
];

/// Walks upward from `start` (a file or directory) looking for a marker
/// file or directory, falling back to `start`'s own directory if none is
/// found anywhere up to the filesystem root.
pub fn find_root(start: &Path) -> PathBuf {
    let mut dir = if start.is_dir() {
        start.to_path_buf()
    } else {
        start.parent().map(Path::to_path_buf).unwrap_or_default()
    };
    let fallback = dir.clone();

    loop {
        if ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            return dir;
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => return fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unknown_language_has_no_candidates() {
        assert!(candidates("cobol").is_empty());
        assert!(resolve_server("cobol").is_none());
    }

    #[test]
    fn find_root_stops_at_nearest_marker() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("Cargo.toml"), "").unwrap();
        let nested = root.path().join("src/inner");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("lib.rs");
        fs::write(&file, "").unwrap();

        assert_eq!(find_root(&file), root.path());
    }

    #[test]
    fn find_root_falls_back_to_own_directory_when_no_marker_found() {
        let root = tempdir().unwrap();
        let nested = root.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("orphan.txt");
        fs::write(&file, "").unwrap();

        assert_eq!(find_root(&file), nested);
    }
}
