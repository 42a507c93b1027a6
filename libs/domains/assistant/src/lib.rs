//! FinOps assistant domain: agent orchestration over streaming model output
//! and JSON-RPC tool backends.
//!
//! The domain is organized around six pieces:
//! - [`credentials`]: native vs. assumed-role credential handles with atomic refresh
//! - [`backends`]: tool backend registry, JSON-RPC client, health tracking
//! - [`agent`]: the bounded reasoning loop and the streaming model client
//! - [`session`]: in-memory session store with explicit lifecycle
//! - [`usage`]: monotonic per-session token/cost counters
//! - [`handlers`]: the HTTP surface (SSE streaming, session management)

pub mod agent;
pub mod backends;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod models;
pub mod session;
pub mod usage;

pub use agent::AgentOrchestrator;
pub use backends::ToolBackendRegistry;
pub use config::AgentConfig;
pub use credentials::CredentialResolver;
pub use error::{AssistantError, AssistantResult};
pub use handlers::{ApiDoc, AssistantState, router};
pub use session::SessionStore;
