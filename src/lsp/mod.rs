//! LSP (Language Server Protocol) plumbing.
//!
//! This module owns the wire-level conversation with SourceKit-LSP:
//!
//! - [`transport`]: Content-Length framed JSON-RPC over byte streams
//! - [`client`]: request correlation, document lifecycle, session states
//! - [`supervisor`]: one shared session per project root
//! - [`types`]: position conversion and symbol-kind names

pub mod client;
pub mod supervisor;
pub mod transport;
pub mod types;

pub use client::{LspClient, LspClientBuilder, LspClientConfig, SessionState};
pub use supervisor::{ServerSession, ServerSupervisor};
