//! Tool-server client — sessions, transports, and tool invocation.
//!
//! This module handles:
//! - Spawning tool-server child processes (line-delimited JSON-RPC over stdio)
//! - Persistent streamed-event connections to endpoint servers
//! - The `initialize` handshake and per-server session tracking
//! - Tool discovery across the fleet and invocation routing
//! - Best-effort fleet connect/close (partial connectivity is normal)

pub mod errors;
pub mod session;
pub mod sse;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use errors::McpError;
pub use session::{Session, SessionRegistry, ToolBackend};
pub use types::{
    join_tool_id, split_tool_id, ConnectionKind, RawContent, ServerDescriptor, ToolDescriptor,
};
