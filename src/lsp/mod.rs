//! LSP client runtime.
//!
//! Layered leaves-first: [`transport`] is pure framing I/O, [`rpc`] is the
//! JSON-RPC multiplexer built on top of it, [`client`] is the LSP-aware
//! supervisor built on top of that, and [`types`], [`uri`], [`languages`]
//! are the shared protocol model the other three layers speak.

pub mod client;
pub mod languages;
pub mod rpc;
pub mod transport;
pub mod types;
pub mod uri;

pub use client::{InitializeError, LspClient, LspError};
