//! Error Types
//!
//! Shared error taxonomy for the synchronization engine. Flow functions catch
//! these at the boundary and convert them into a `SyncOutcome`; nothing in the
//! engine panics across a flow invocation.

use thiserror::Error;

/// Errors raised by the synchronization engine
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or malformed configuration, detected before any connection work
    #[error("configuration error: {0}")]
    Config(String),

    /// Buffer store (DuckDB) failure
    #[error("buffer store error: {0}")]
    Buffer(#[from] duckdb::Error),

    /// ERP link failure (connect, query or execute)
    #[error("ERP link error: {0}")]
    Erp(String),

    /// Token endpoint refused or returned an unusable response
    #[error("remote authentication failed: {0}")]
    RemoteAuth(String),

    /// Transport-level HTTP failure against the remote API
    #[error("remote request failed: {0}")]
    RemoteTransport(#[from] reqwest::Error),

    /// Remote API answered with a non-success status
    #[error("remote returned status {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Remote responses outside 200/201 leave the record unsynced for the
    /// next invocation; callers use this to tell those apart from transport
    /// failures when deciding what to log.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(self, SyncError::RemoteStatus { .. })
    }
}
