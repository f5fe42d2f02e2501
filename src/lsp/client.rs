//! The LSP-aware supervisor: spawns a language server, performs the
//! initialize handshake, tracks readiness and diagnostics, and exposes the
//! typed request surface the `lsp-cli` binary drives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lsp_types::{
    ClientCapabilities, ClientInfo, DefinitionClientCapabilities, DocumentSymbolClientCapabilities,
    HoverClientCapabilities, ImplementationClientCapabilities, InitializeParams, InitializedParams,
    PublishDiagnosticsClientCapabilities, ReferenceClientCapabilities, TextDocumentClientCapabilities,
    Uri, WorkspaceFolder,
};
use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::sync::Notify;

use super::languages::language_id_for;
use super::rpc::{Connection, ProtocolError};
use super::transport::Transport;
use super::types::{
    normalize_document_symbols, normalize_locations, Diagnostic, DocumentSymbolsResult, Hover,
    Location, Position, PublishDiagnosticsParams, SymbolInformation, TextDocumentIdentifier,
    TextDocumentItem, WorkspaceSymbolParams,
};
use super::uri::file_uri;

/// Everything that can go wrong spawning and initializing a language server.
/// Terminal for the [`LspClient`] under construction.
#[derive(Debug, thiserror::Error)]
pub enum InitializeError {
    #[error("failed to resolve workspace root {path}: {source}")]
    RootDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn language server {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("language server did not expose stdio pipes")]
    MissingPipes,
    #[error("invalid root URI: {0}")]
    RootUri(String),
    #[error(transparent)]
    Handshake(#[from] ProtocolError),
}

/// Errors surfaced after a successful startup.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    Argument(String),
}

fn require_uri(uri: &str) -> Result<(), LspError> {
    if uri.is_empty() {
        return Err(LspError::Argument("uri must not be empty".to_string()));
    }
    Ok(())
}

/// One-shot, two-source readiness signal: fired by either the first
/// `$/progress` "end" event or the first `publishDiagnostics`. Level
/// triggered — callers arriving after the signal return immediately.
struct ReadyLatch {
    ready: AtomicBool,
    notify: Notify,
}

impl ReadyLatch {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn signal(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    async fn wait(&self, timeout: Duration) -> bool {
        let notified = self.notify.notified();
        if self.ready.load(Ordering::SeqCst) {
            return true;
        }
        tokio::pin!(notified);
        match tokio::time::timeout(timeout, notified).await {
            Ok(_) => true,
            Err(_) => self.ready.load(Ordering::SeqCst),
        }
    }
}

type DiagnosticsMap = SyncMutex<HashMap<String, Vec<Diagnostic>>>;

/// Supervises one language server subprocess for the lifetime of the
/// client. See `SPEC_FULL.md` §4.3 for the full lifecycle and §5 for the
/// concurrency model this type relies on.
pub struct LspClient {
    child: Child,
    connection: Connection,
    root_uri: String,
    verbose: bool,
    diagnostics: Arc<DiagnosticsMap>,
    diagnostics_notify: Arc<Notify>,
    ready: Arc<ReadyLatch>,
    closed: AtomicBool,
}

impl LspClient {
    /// Spawns `command[0]` with the remaining elements as arguments, rooted
    /// at `root_dir`, and performs the initialize/initialized handshake.
    /// Any failure terminates the (possibly already-spawned) child and
    /// returns [`InitializeError`].
    pub async fn start(
        command: Vec<String>,
        root_dir: PathBuf,
        verbose: bool,
    ) -> Result<Self, InitializeError> {
        let abs_root = tokio::fs::canonicalize(&root_dir)
            .await
            .map_err(|source| InitializeError::RootDir {
                path: root_dir.clone(),
                source,
            })?;
        let root_uri = file_uri(&abs_root);

        let program = command.first().cloned().unwrap_or_default();
        let mut cmd = Command::new(&program);
        cmd.args(command.iter().skip(1))
            .current_dir(&abs_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if verbose { Stdio::inherit() } else { Stdio::null() });

        let mut child = cmd.spawn().map_err(|source| InitializeError::Spawn {
            command: program.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(InitializeError::MissingPipes)?;
        let stdout = child.stdout.take().ok_or(InitializeError::MissingPipes)?;

        let diagnostics: Arc<DiagnosticsMap> = Arc::new(SyncMutex::new(HashMap::new()));
        let diagnostics_notify = Arc::new(Notify::new());
        let ready = Arc::new(ReadyLatch::new());

        let sink_diagnostics = Arc::clone(&diagnostics);
        let sink_diagnostics_notify = Arc::clone(&diagnostics_notify);
        let sink_ready = Arc::clone(&ready);
        let sink_verbose = verbose;

        let transport = Transport::new(BufReader::with_capacity(64 * 1024, stdout), stdin);
        let connection = Connection::new(
            transport,
            Box::new(move |method, params| {
                handle_notification(
                    method,
                    params,
                    &sink_diagnostics,
                    &sink_diagnostics_notify,
                    &sink_ready,
                    sink_verbose,
                )
            }),
        );

        let mut client = Self {
            child,
            connection,
            root_uri,
            verbose,
            diagnostics,
            diagnostics_notify,
            ready,
            closed: AtomicBool::new(false),
        };

        if let Err(e) = client.initialize().await {
            let _ = client.child.start_kill();
            let _ = client.child.wait().await;
            return Err(e);
        }

        Ok(client)
    }

    async fn initialize(&mut self) -> Result<(), InitializeError> {
        let root_uri = Uri::from_str(&self.root_uri)
            .map_err(|e| InitializeError::RootUri(format!("{}: {e}", self.root_uri)))?;

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            capabilities: ClientCapabilities {
                text_document: Some(TextDocumentClientCapabilities {
                    definition: Some(DefinitionClientCapabilities {
                        link_support: Some(true),
                        ..Default::default()
                    }),
                    implementation: Some(ImplementationClientCapabilities {
                        link_support: Some(true),
                        ..Default::default()
                    }),
                    references: Some(ReferenceClientCapabilities {
                        ..Default::default()
                    }),
                    hover: Some(HoverClientCapabilities {
                        content_format: Some(vec![
                            lsp_types::MarkupKind::PlainText,
                            lsp_types::MarkupKind::Markdown,
                        ]),
                        ..Default::default()
                    }),
                    document_symbol: Some(DocumentSymbolClientCapabilities {
                        hierarchical_document_symbol_support: Some(true),
                        ..Default::default()
                    }),
                    publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                        related_information: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: "root".to_string(),
            }]),
            client_info: Some(ClientInfo {
                name: "lsp-cli".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        };

        self.connection.call("initialize", params).await?;
        self.connection
            .notify("initialized", InitializedParams {})
            .await?;
        Ok(())
    }

    /// Blocks until the readiness latch fires or `timeout` elapses. Once
    /// fired, every subsequent call returns `true` immediately.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.ready.wait(timeout).await
    }

    /// Resolves `path`, reads it, infers its `languageId`, and sends
    /// `textDocument/didOpen` at version 1. Returns the file's URI.
    pub async fn open_file(&self, path: &Path) -> Result<String, LspError> {
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let text = tokio::fs::read_to_string(&abs_path).await?;
        let uri = file_uri(&abs_path);
        let language_id = language_id_for(&abs_path).to_string();

        #[derive(Serialize)]
        struct DidOpenParams {
            #[serde(rename = "textDocument")]
            text_document: TextDocumentItem,
        }

        self.connection
            .notify(
                "textDocument/didOpen",
                DidOpenParams {
                    text_document: TextDocumentItem {
                        uri: uri.clone(),
                        language_id,
                        version: 1,
                        text,
                    },
                },
            )
            .await?;

        Ok(uri)
    }

    /// Sends `textDocument/didClose` for `uri`.
    pub async fn close_file(&self, uri: &str) -> Result<(), LspError> {
        require_uri(uri)?;

        #[derive(Serialize)]
        struct DidCloseParams {
            #[serde(rename = "textDocument")]
            text_document: TextDocumentIdentifier,
        }

        self.connection
            .notify(
                "textDocument/didClose",
                DidCloseParams {
                    text_document: TextDocumentIdentifier { uri: uri.to_string() },
                },
            )
            .await?;
        Ok(())
    }

    /// `textDocument/definition`, normalized to a plain location list.
    pub async fn definition(&self, uri: &str, line: u32, col: u32) -> Result<Vec<Location>, LspError> {
        require_uri(uri)?;
        let raw = self
            .connection
            .call("textDocument/definition", position_params(uri, line, col))
            .await?;
        if self.verbose {
            tracing::debug!(%uri, line, col, response = %raw, "definition response");
        }
        Ok(normalize_locations(&raw)?)
    }

    /// `textDocument/implementation`, normalized to a plain location list.
    pub async fn implementations(
        &self,
        uri: &str,
        line: u32,
        col: u32,
    ) -> Result<Vec<Location>, LspError> {
        require_uri(uri)?;
        let raw = self
            .connection
            .call("textDocument/implementation", position_params(uri, line, col))
            .await?;
        Ok(normalize_locations(&raw)?)
    }

    /// `textDocument/references`.
    pub async fn references(
        &self,
        uri: &str,
        line: u32,
        col: u32,
        include_declaration: bool,
    ) -> Result<Vec<Location>, LspError> {
        require_uri(uri)?;

        #[derive(Serialize)]
        struct ReferenceContext {
            #[serde(rename = "includeDeclaration")]
            include_declaration: bool,
        }
        #[derive(Serialize)]
        struct ReferencesParams {
            #[serde(flatten)]
            position: PositionParams,
            context: ReferenceContext,
        }

        let raw = self
            .connection
            .call(
                "textDocument/references",
                ReferencesParams {
                    position: position_params(uri, line, col),
                    context: ReferenceContext { include_declaration },
                },
            )
            .await?;

        if raw.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(raw).map_err(ProtocolError::from)?)
    }

    /// `textDocument/hover`.
    pub async fn hover(&self, uri: &str, line: u32, col: u32) -> Result<Option<Hover>, LspError> {
        require_uri(uri)?;
        let raw = self
            .connection
            .call("textDocument/hover", position_params(uri, line, col))
            .await?;
        if raw.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(raw).map_err(ProtocolError::from)?))
    }

    /// `textDocument/documentSymbol`, normalized to the hierarchical-or-flat
    /// result.
    pub async fn document_symbols(&self, uri: &str) -> Result<DocumentSymbolsResult, LspError> {
        require_uri(uri)?;

        #[derive(Serialize)]
        struct DocumentSymbolParams {
            #[serde(rename = "textDocument")]
            text_document: TextDocumentIdentifier,
        }

        let raw = self
            .connection
            .call(
                "textDocument/documentSymbol",
                DocumentSymbolParams {
                    text_document: TextDocumentIdentifier { uri: uri.to_string() },
                },
            )
            .await?;
        Ok(normalize_document_symbols(&raw)?)
    }

    /// `workspace/symbol`.
    pub async fn workspace_symbols(&self, query: &str) -> Result<Vec<SymbolInformation>, LspError> {
        let raw = self
            .connection
            .call(
                "workspace/symbol",
                WorkspaceSymbolParams { query: query.to_string() },
            )
            .await?;
        Ok(serde_json::from_value(raw).map_err(ProtocolError::from)?)
    }

    /// Current diagnostics for one URI (empty if none have arrived yet).
    pub fn get_diagnostics(&self, uri: &str) -> Vec<Diagnostic> {
        self.diagnostics.lock().get(uri).cloned().unwrap_or_default()
    }

    /// A defensive copy of every URI's most recently published diagnostics.
    pub fn all_diagnostics(&self) -> HashMap<String, Vec<Diagnostic>> {
        self.diagnostics.lock().clone()
    }

    /// Returns immediately if `uri` already has an entry; otherwise awaits
    /// the next diagnostics notification of any kind and returns whatever
    /// is on file for `uri` afterward (which may still be empty).
    pub async fn wait_for_diagnostics(&self, uri: &str) -> Vec<Diagnostic> {
        let notified = self.diagnostics_notify.notified();
        if let Some(diags) = self.diagnostics.lock().get(uri).cloned() {
            return diags;
        }
        tokio::pin!(notified);
        notified.await;
        self.diagnostics.lock().get(uri).cloned().unwrap_or_default()
    }

    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }

    /// Sends `shutdown` then `exit`, closes the connection, and terminates
    /// and reaps the child. Idempotent.
    pub async fn close(&mut self) -> Result<(), LspError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.connection.call("shutdown", Value::Null).await;
        let _ = self.connection.notify("exit", Value::Null).await;
        self.connection.close();
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        Ok(())
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            let _ = self.child.start_kill();
        }
    }
}

#[derive(Serialize)]
struct PositionParams {
    #[serde(rename = "textDocument")]
    text_document: TextDocumentIdentifier,
    position: Position,
}

fn position_params(uri: &str, line: u32, col: u32) -> PositionParams {
    PositionParams {
        text_document: TextDocumentIdentifier { uri: uri.to_string() },
        position: Position::new(line, col),
    }
}

fn handle_notification(
    method: &str,
    params: Value,
    diagnostics: &Arc<DiagnosticsMap>,
    diagnostics_notify: &Arc<Notify>,
    ready: &Arc<ReadyLatch>,
    verbose: bool,
) {
    match method {
        "textDocument/publishDiagnostics" => {
            match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                Ok(parsed) => {
                    diagnostics.lock().insert(parsed.uri, parsed.diagnostics);
                    // Receiving diagnostics at all means the server has
                    // processed at least one file — a reliable readiness
                    // signal for servers that never emit $/progress.
                    ready.signal();
                    diagnostics_notify.notify_waiters();
                }
                Err(e) if verbose => tracing::debug!("malformed publishDiagnostics: {e}"),
                Err(_) => {}
            }
        }
        "$/progress" => {
            let kind = params
                .get("value")
                .and_then(|v| v.get("kind"))
                .and_then(|k| k.as_str());
            if verbose {
                let token = params.get("token").and_then(|t| t.as_str()).unwrap_or("?");
                tracing::debug!(token, ?kind, "progress notification");
            }
            if kind == Some("end") {
                ready.signal();
            }
        }
        other if verbose => tracing::debug!(method = other, "ignoring notification"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_latch_unsignaled() -> ReadyLatch {
        ReadyLatch::new()
    }

    #[tokio::test]
    async fn ready_latch_times_out_until_signaled() {
        let latch = ready_latch_unsignaled();
        assert!(!latch.wait(Duration::from_millis(20)).await);
        latch.signal();
        assert!(latch.wait(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn ready_latch_is_idempotent_and_level_triggered() {
        let latch = ready_latch_unsignaled();
        latch.signal();
        latch.signal(); // second signal must not panic or double-fire anything observable
        assert!(latch.wait(Duration::from_secs(1)).await);
    }

    #[test]
    fn require_uri_rejects_empty_string() {
        assert!(require_uri("").is_err());
        assert!(require_uri("file:///a").is_ok());
    }

    // The remaining scenarios from SPEC_FULL.md §8 (initialize/shutdown,
    // out-of-order responses, readiness via progress/diagnostics, transport
    // closed mid-call) are exercised directly against `Connection` in
    // `lsp::rpc::tests`, since that's the layer they're properties of; this
    // module additionally covers the notification-handling glue specific to
    // `LspClient` (diagnostics storage, readiness wiring) below.

    #[tokio::test]
    async fn publish_diagnostics_replaces_not_merges() {
        let diagnostics: Arc<DiagnosticsMap> = Arc::new(SyncMutex::new(HashMap::new()));
        let notify = Arc::new(Notify::new());
        let ready = Arc::new(ReadyLatch::new());

        let first = serde_json::json!({
            "uri": "file:///a.rs",
            "diagnostics": [{"range": {"start": {"line":0,"character":0}, "end": {"line":0,"character":1}}, "message": "first"}]
        });
        handle_notification(
            "textDocument/publishDiagnostics",
            first,
            &diagnostics,
            &notify,
            &ready,
            false,
        );
        assert_eq!(diagnostics.lock().get("file:///a.rs").unwrap().len(), 1);

        let second = serde_json::json!({"uri": "file:///a.rs", "diagnostics": []});
        handle_notification(
            "textDocument/publishDiagnostics",
            second,
            &diagnostics,
            &notify,
            &ready,
            false,
        );
        assert!(diagnostics.lock().get("file:///a.rs").unwrap().is_empty());
        assert!(ready.ready.load(Ordering::SeqCst));
    }

    #[test]
    fn progress_end_signals_ready_but_begin_does_not() {
        let diagnostics: Arc<DiagnosticsMap> = Arc::new(SyncMutex::new(HashMap::new()));
        let notify = Arc::new(Notify::new());
        let ready = Arc::new(ReadyLatch::new());

        handle_notification(
            "$/progress",
            serde_json::json!({"token": "t1", "value": {"kind": "begin"}}),
            &diagnostics,
            &notify,
            &ready,
            false,
        );
        assert!(!ready.ready.load(Ordering::SeqCst));

        handle_notification(
            "$/progress",
            serde_json::json!({"token": "t1", "value": {"kind": "end"}}),
            &diagnostics,
            &notify,
            &ready,
            false,
        );
        assert!(ready.ready.load(Ordering::SeqCst));
    }
}
