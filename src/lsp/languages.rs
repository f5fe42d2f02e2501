//! File-extension to LSP `languageId` mapping, used by [`LspClient::open_file`]
//! to fill in `TextDocumentItem::language_id`.
//!
//! [`LspClient::open_file`]: crate::lsp::client::LspClient::open_file

use std::path::Path;

/// Infers the LSP language identifier from a file's extension. Anything
/// unrecognized falls back to `"plaintext"`.
pub fn language_id_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match ext.as_str() {
        "go" => "go",
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "jsx" => "javascriptreact",
        "rs" => "rust",
        "c" => "c",
        "cpp" | "cc" | "cxx" | "h" | "hpp" => "cpp",
        "java" => "java",
        "rb" => "ruby",
        "cs" => "csharp",
        "lua" => "lua",
        "sh" | "bash" => "shellscript",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "md" => "markdown",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn known_extensions_map_correctly() {
        assert_eq!(language_id_for(&PathBuf::from("main.go")), "go");
        assert_eq!(language_id_for(&PathBuf::from("lib.rs")), "rust");
        assert_eq!(language_id_for(&PathBuf::from("a/b/c.tsx")), "typescriptreact");
        assert_eq!(language_id_for(&PathBuf::from("Main.JAVA")), "java");
    }

    #[test]
    fn unknown_extension_is_plaintext() {
        assert_eq!(language_id_for(&PathBuf::from("README")), "plaintext");
        assert_eq!(language_id_for(&PathBuf::from("data.proto")), "plaintext");
    }
}
