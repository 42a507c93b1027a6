//! Configuration for the FinOps assistant API

use core_config::{AppInfo, FromEnv, app_info, server::ServerConfig};
use domain_assistant::AgentConfig;

pub use core_config::Environment;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub server: ServerConfig,
    pub environment: Environment,
    pub agent: AgentConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            app: app_info!(),
            server: ServerConfig::from_env()?,
            environment: Environment::from_env(),
            agent: AgentConfig::from_env()?,
        })
    }
}
