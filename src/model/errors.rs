//! Model collaborator error types.

use thiserror::Error;

/// Errors that can occur during a model call.
///
/// A model call failure is fatal to the current query only — sessions and
/// the registry are unaffected and the next query starts clean.
#[derive(Debug, Error)]
pub enum ModelError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The endpoint answered but the body was not a usable completion.
    #[error("model returned an unusable response: {reason}")]
    InvalidResponse {
        reason: String,
    },

    /// Every retry attempt failed.
    #[error("model call failed after {attempts} attempts: {reason}")]
    RetriesExhausted {
        attempts: u32,
        reason: String,
    },
}
