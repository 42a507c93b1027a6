//! JSON-RPC tool backends: wire protocol, HTTP client, and the registry
//! that owns the catalog and dispatches invocations.

pub mod client;
pub mod protocol;
pub mod registry;

pub use client::{BackendClient, BackendTransport, HttpBackendTransport};
pub use protocol::{CallToolResult, ToolDescriptor};
pub use registry::{BackendConfig, ToolBackendRegistry};
