//! Client for the completion daemon and its wire protocol.
//!
//! The daemon is a long-lived child process addressed over stdin/stdout
//! with a line protocol: one tab-joined request line in, zero or more
//! response lines out, terminated by a sentinel. [`client`] owns the
//! process (including crash recovery); [`protocol`], [`hover`] and
//! [`signature`] decode responses into the shared record types;
//! [`queries`] ties both together into editor-facing operations.

pub mod client;
pub mod hover;
pub mod protocol;
pub mod queries;
pub mod signature;

pub use client::{Daemon, DaemonSpec, DaemonStatus};
pub use queries::Query;
