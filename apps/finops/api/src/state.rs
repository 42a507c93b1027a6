//! Application state management

use domain_assistant::{AssistantState, CredentialResolver};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::Config,
    pub assistant: AssistantState,
    pub resolver: Arc<CredentialResolver>,
}
