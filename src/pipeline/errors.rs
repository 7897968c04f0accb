//! Pipeline error types.

use thiserror::Error;

/// Errors that reject a query before it starts.
///
/// Everything that can go wrong after acceptance — model failures, per-call
/// tool failures — is folded into the `QueryResult` trace instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No server in the fleet has a live session; queries cannot be served.
    #[error("no tool servers connected")]
    NoServersConnected,
}
