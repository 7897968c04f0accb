//! Tool-server client error types.

use thiserror::Error;

/// Errors that can occur while talking to tool servers.
///
/// Connection and invocation failures are isolated per server / per call;
/// none of these abort the fleet or a whole query on their own.
#[derive(Debug, Error)]
pub enum McpError {
    /// A server could not be reached or spawned.
    #[error("failed to connect to server '{name}': {reason}")]
    Connection {
        name: String,
        reason: String,
    },

    /// A call targeted a server with no live session.
    ///
    /// Absence of a session is a normal state — this only surfaces when a
    /// caller explicitly requires the server.
    #[error("server '{name}' is not connected")]
    NotConnected {
        name: String,
    },

    /// Malformed frames, closed pipes, or handshake violations.
    #[error("protocol error from server '{server}': {reason}")]
    Protocol {
        server: String,
        reason: String,
    },

    /// The server processed the call and reported a failure.
    #[error("tool '{tool}' on server '{server}' failed: {reason}")]
    Invocation {
        server: String,
        tool: String,
        reason: String,
    },

    /// A tool call exceeded the configured per-call timeout.
    #[error("tool '{tool}' on server '{server}' timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        tool: String,
        timeout_ms: u64,
    },
}
