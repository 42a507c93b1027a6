//! The reasoning loop and its streaming model client.

pub mod model;
pub mod orchestrator;
pub mod prompts;

pub use model::{AnthropicClient, ModelClient, ModelEvent, ModelEventStream};
pub use orchestrator::AgentOrchestrator;
