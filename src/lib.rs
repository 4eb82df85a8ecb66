//! # SAISEI: Live-Code Regeneration Engine
//!
//! SAISEI treats an ordered set of chat messages, written by trusted
//! authors in designated channels, as the authoritative source of a running
//! program. Whenever a fragment is posted, edited or deleted, the engine
//! re-derives the whole program state: it clears the handler registry and
//! re-evaluates every fragment, in arrival order, against a shared
//! namespace that survives across cycles. Authors see each fragment's
//! outcome as a reaction marker on their own message; operators get a
//! textual report per failure in a log channel.
//!
//! ## Processing pipeline
//!
//! ```text
//! Gateway event → System intake → FragmentStore mutation → Engine.refresh
//!     → (per fragment: extract fenced blocks → parse → evaluate → annotate)
//!     → HandlerRegistry ready for EventRouter dispatch
//! ```
//!
//! Fragments are written in a small statement language (see [`parser`] and
//! [`ast`]); evaluation ([`eval`]) runs against an execution context
//! carrying the shared namespace, per-evaluation locals, and capability
//! functions. Capabilities ([`capability`]) resolve from a startup snapshot
//! and may demand a process restart after installing.
//!
//! The chat transport is abstracted behind [`gateway::ChatGateway`]; a
//! line-delimited JSON adapter over stdio ships for development.

pub mod annotate;
pub mod ast;
pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod fragment;
pub mod gateway;
pub mod parser;
pub mod report;
pub mod router;
pub mod system;

// Re-exports
pub use ast::*;
pub use error::*;
pub use parser::*;
