//! `lsp-cli` — queries a language server for navigation, hover, symbol, and
//! diagnostic information on behalf of interactive users and automated
//! coding agents.
//!
//! This binary is a thin shell: argument parsing, server discovery,
//! workspace-root discovery, and output formatting. All of the engineering
//! depth lives in [`agent_cli_tools::lsp`].

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use agent_cli_tools::config::ClientConfig;
use agent_cli_tools::output::{
    format_all_diagnostics, format_diagnostics, format_document_symbols, format_hover,
    format_locations, OutputFormat,
};
use agent_cli_tools::{discovery, LspClient};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lsp-cli", about = "Drive an LSP server from the command line")]
struct Cli {
    /// Workspace root to spawn the server in. Defaults to the marker-file
    /// walk from the target file's directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Override server discovery with an explicit argv, e.g.
    /// `--server "rust-analyzer"`.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Inherit the server's stderr and emit debug-level protocol logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Seconds to wait for the readiness signal before querying anyway.
    #[arg(long, default_value_t = 10, global = true)]
    ready_timeout: u64,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[derive(Args)]
struct Position {
    /// File to query.
    file: PathBuf,
    /// One-based line number.
    line: u32,
    /// One-based column number.
    col: u32,
}

#[derive(Subcommand)]
enum Command {
    /// `textDocument/definition`
    Definition(Position),
    /// `textDocument/implementation`
    Implementations(Position),
    /// `textDocument/references`
    References {
        #[command(flatten)]
        position: Position,
        /// Include the declaration itself in the results.
        #[arg(long)]
        include_declaration: bool,
    },
    /// `textDocument/hover`
    Hover(Position),
    /// `textDocument/documentSymbol`
    Symbols {
        /// File to query.
        file: PathBuf,
    },
    /// `workspace/symbol`
    WorkspaceSymbols {
        /// Query string passed verbatim to the server.
        query: String,
        /// Any file in the target workspace, used for root/server discovery.
        #[arg(long)]
        file: PathBuf,
    },
    /// Current diagnostics for one file (waits for the first batch if none
    /// have arrived yet).
    Diagnostics {
        /// File to query.
        file: PathBuf,
    },
    /// Every diagnostic the server has published so far, across all files.
    AllDiagnostics {
        /// Any file in the target workspace, used for root/server discovery.
        #[arg(long)]
        file: PathBuf,
    },
}

impl Command {
    fn target_file(&self) -> &PathBuf {
        match self {
            Command::Definition(p) | Command::Implementations(p) | Command::Hover(p) => &p.file,
            Command::References { position, .. } => &position.file,
            Command::Symbols { file } | Command::Diagnostics { file } => file,
            Command::WorkspaceSymbols { file, .. } | Command::AllDiagnostics { file, .. } => file,
        }
    }
}

/// Sets up logging: a compact stderr layer always (stdout is reserved for
/// query results), plus a non-blocking rolling file layer under `--verbose`
/// so a server's misbehavior can be diagnosed after the fact. The returned
/// guard must be held for the process lifetime — dropping it stops the
/// background writer thread mid-flush.
fn init_logging(verbose: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let make_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if verbose {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("warn")
            }
        })
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    if !verbose {
        tracing_subscriber::registry()
            .with(make_filter())
            .with(stderr_layer)
            .init();
        return None;
    }

    let log_dir = std::env::temp_dir().join("lsp-cli-logs");
    let file_appender = tracing_appender::rolling::daily(&log_dir, "lsp-cli.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(make_filter())
        .with(stderr_layer)
        .with(fmt::layer().json().with_writer(non_blocking))
        .init();

    Some(guard)
}

/// Translates a one-based human position into the zero-based position the
/// core expects, rejecting anything below 1.
fn zero_based(line: u32, col: u32) -> anyhow::Result<(u32, u32)> {
    if line == 0 || col == 0 {
        anyhow::bail!("line and column are one-based and must be >= 1");
    }
    Ok((line - 1, col - 1))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose);

    match run(cli).await {
        Ok(RunOutcome::Found(text)) => {
            println!("{text}");
            ExitCode::from(0)
        }
        Ok(RunOutcome::Empty(text)) => {
            println!("{text}");
            eprintln!("no results");
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

enum RunOutcome {
    Found(String),
    Empty(String),
}

async fn run(cli: Cli) -> anyhow::Result<RunOutcome> {
    let target_file = cli.command.target_file().clone();
    let abs_target = if target_file.is_absolute() {
        target_file.clone()
    } else {
        std::env::current_dir()?.join(&target_file)
    };

    let root_dir = cli
        .root
        .clone()
        .unwrap_or_else(|| discovery::find_root(&abs_target));

    let language_id = agent_cli_tools::lsp::languages::language_id_for(&abs_target);
    let command = match &cli.server {
        Some(server) => server.split_whitespace().map(str::to_string).collect(),
        None => discovery::resolve_server(language_id).ok_or_else(|| {
            anyhow::anyhow!("no known language server found on PATH for languageId `{language_id}`; pass --server explicitly")
        })?,
    };

    let config = ClientConfig::new(command, root_dir, cli.verbose);
    let mut client = LspClient::start(config.command, config.root_dir, config.verbose).await?;

    let ready_timeout = Duration::from_secs(cli.ready_timeout);
    if !client.wait_ready(ready_timeout).await && cli.verbose {
        eprintln!("warning: server did not signal readiness within {ready_timeout:?}; querying anyway");
    }

    let format: OutputFormat = cli.format.into();
    let outcome = dispatch(&mut client, &cli.command, &abs_target, format).await;

    let _ = client.close().await;
    outcome
}

async fn dispatch(
    client: &mut LspClient,
    command: &Command,
    abs_target: &PathBuf,
    format: OutputFormat,
) -> anyhow::Result<RunOutcome> {
    match command {
        Command::Definition(pos) => {
            let uri = client.open_file(abs_target).await?;
            let (line, col) = zero_based(pos.line, pos.col)?;
            let locations = client.definition(&uri, line, col).await?;
            let empty = locations.is_empty();
            let text = format_locations(&locations, format);
            Ok(if empty { RunOutcome::Empty(text) } else { RunOutcome::Found(text) })
        }
        Command::Implementations(pos) => {
            let uri = client.open_file(abs_target).await?;
            let (line, col) = zero_based(pos.line, pos.col)?;
            let locations = client.implementations(&uri, line, col).await?;
            let empty = locations.is_empty();
            let text = format_locations(&locations, format);
            Ok(if empty { RunOutcome::Empty(text) } else { RunOutcome::Found(text) })
        }
        Command::References { position, include_declaration } => {
            let uri = client.open_file(abs_target).await?;
            let (line, col) = zero_based(position.line, position.col)?;
            let locations = client.references(&uri, line, col, *include_declaration).await?;
            let empty = locations.is_empty();
            let text = format_locations(&locations, format);
            Ok(if empty { RunOutcome::Empty(text) } else { RunOutcome::Found(text) })
        }
        Command::Hover(pos) => {
            let uri = client.open_file(abs_target).await?;
            let (line, col) = zero_based(pos.line, pos.col)?;
            match client.hover(&uri, line, col).await? {
                Some(hover) => Ok(RunOutcome::Found(format_hover(&hover, format))),
                None => Ok(RunOutcome::Empty("no hover information".to_string())),
            }
        }
        Command::Symbols { .. } => {
            let uri = client.open_file(abs_target).await?;
            let result = client.document_symbols(&uri).await?;
            let is_empty = match &result {
                agent_cli_tools::lsp::types::DocumentSymbolsResult::Hierarchical(v) => v.is_empty(),
                agent_cli_tools::lsp::types::DocumentSymbolsResult::Flat(v) => v.is_empty(),
            };
            let text = format_document_symbols(&result, format);
            Ok(if is_empty { RunOutcome::Empty(text) } else { RunOutcome::Found(text) })
        }
        Command::WorkspaceSymbols { query, .. } => {
            let symbols = client.workspace_symbols(query).await?;
            let empty = symbols.is_empty();
            let text = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&symbols).unwrap_or_default(),
                OutputFormat::Text => symbols
                    .iter()
                    .map(|s| format!("{} ({})", s.name, s.kind.name()))
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            Ok(if empty { RunOutcome::Empty("no symbols".to_string()) } else { RunOutcome::Found(text) })
        }
        Command::Diagnostics { .. } => {
            let uri = client.open_file(abs_target).await?;
            let diagnostics = client.wait_for_diagnostics(&uri).await;
            let empty = diagnostics.is_empty();
            let text = format_diagnostics(&uri, &diagnostics, format);
            Ok(if empty { RunOutcome::Empty(text) } else { RunOutcome::Found(text) })
        }
        Command::AllDiagnostics { .. } => {
            let _ = client.open_file(abs_target).await?;
            let all = client.all_diagnostics();
            let empty = all.values().all(|v| v.is_empty());
            let text = format_all_diagnostics(&all, format);
            Ok(if empty { RunOutcome::Empty(text) } else { RunOutcome::Found(text) })
        }
    }
}
