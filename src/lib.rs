//! Core LSP client runtime shared by the `lsp-cli` and `e` binaries.
//!
//! `lsp` is the subject of this crate: a long-lived subprocess supervisor
//! that speaks JSON-RPC 2.0 over the LSP base-protocol framing. Everything
//! else here (`config`, `discovery`, `output`) is plumbing the binaries use
//! to drive it.

pub mod config;
pub mod discovery;
pub mod lsp;
pub mod output;

pub use lsp::client::{InitializeError, LspClient, LspError};
