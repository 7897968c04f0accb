//! Model collaborator — OpenAI-compatible chat completion client.
//!
//! This module handles all communication with the chat-completion endpoint:
//! - Request building (conversation + optional tool catalog)
//! - Response parsing into a normalized `Completion`
//! - Bounded internal retry on transient transport failures
//!
//! The client speaks the OpenAI Chat Completions shape, making the model
//! interchangeable via config rather than code.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{HttpModelClient, ModelClient};
pub use errors::ModelError;
pub use types::{ChatMessage, Completion, Role, ToolCallRequest};
