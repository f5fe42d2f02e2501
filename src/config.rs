//! The `{ command, root_dir, verbose }` surface [`crate::lsp::client::LspClient`]
//! is constructed from, built up by the binaries from `clap`-parsed flags and
//! server discovery.

use std::path::PathBuf;

/// Everything [`LspClient::start`](crate::lsp::client::LspClient::start)
/// needs to spawn and supervise one language server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Argv for the server process; `command[0]` is the executable.
    pub command: Vec<String>,
    /// Workspace root the server is rooted at and its process is spawned in.
    pub root_dir: PathBuf,
    /// When set, the server's stderr is inherited and debug-level
    /// notification/progress logging is emitted.
    pub verbose: bool,
}

impl ClientConfig {
    pub fn new(command: Vec<String>, root_dir: PathBuf, verbose: bool) -> Self {
        Self {
            command,
            root_dir,
            verbose,
        }
    }
}
