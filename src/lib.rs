pub mod config;
pub mod mcp_client;
pub mod model;
pub mod observer;
pub mod pipeline;

pub use config::{AppConfig, PolicyResolver};
pub use mcp_client::{SessionRegistry, ToolBackend};
pub use model::{HttpModelClient, ModelClient};
pub use observer::{NoopObserver, PipelineObserver, TracingObserver};
pub use pipeline::{QueryOrchestrator, QueryResult, TransformerRegistry};
