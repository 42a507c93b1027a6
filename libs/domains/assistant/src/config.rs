//! Environment-driven configuration for the agent core.

use core_config::{ConfigError, FromEnv, env_flag, env_or_default, env_required};
use std::str::FromStr;

/// Default model when MODEL_ID is not set
pub const DEFAULT_MODEL_ID: &str = "us.anthropic.claude-3-7-sonnet-20250219-v1:0";

/// Agent configuration, supplied at process start; not hot-reloaded
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier used for generation and pricing lookup
    pub model_id: String,
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub model_max_tokens: u32,
    /// Idle timeout for the model's SSE stream
    pub model_timeout_secs: u64,
    /// Cross-account role to assume; native scope when unset
    pub target_role_arn: Option<String>,
    pub role_session_duration_secs: i32,
    pub aws_region: String,
    /// Model round trip bound per turn
    pub max_steps: usize,
    pub tool_call_timeout_secs: u64,
    pub billing_mcp_url: String,
    pub aws_api_mcp_url: String,
    pub enable_aws_api_server: bool,
}

impl FromEnv for AgentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            model_id: env_or_default("MODEL_ID", DEFAULT_MODEL_ID),
            anthropic_api_key: env_required("ANTHROPIC_API_KEY")?,
            anthropic_base_url: env_or_default("ANTHROPIC_BASE_URL", "https://api.anthropic.com"),
            model_max_tokens: parse_env("MODEL_MAX_TOKENS", "8192")?,
            model_timeout_secs: parse_env("MODEL_TIMEOUT_SECS", "120")?,
            target_role_arn: std::env::var("TARGET_ROLE_ARN")
                .ok()
                .filter(|arn| !arn.trim().is_empty()),
            role_session_duration_secs: parse_env("ROLE_SESSION_DURATION_SECS", "3600")?,
            aws_region: env_or_default("AWS_DEFAULT_REGION", "us-east-1"),
            max_steps: parse_env("AGENT_MAX_STEPS", "10")?,
            tool_call_timeout_secs: parse_env("TOOL_CALL_TIMEOUT_SECS", "60")?,
            billing_mcp_url: env_or_default("BILLING_MCP_URL", "http://localhost:8000/mcp"),
            aws_api_mcp_url: env_or_default("AWS_API_MCP_URL", "http://localhost:8001/mcp"),
            enable_aws_api_server: env_flag("ENABLE_AWS_API_SERVER", true),
        })
    }
}

/// Parse an environment variable with a default, surfacing parse failures
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_only_api_key_set() {
        temp_env::with_vars(
            [
                ("ANTHROPIC_API_KEY", Some("test-key")),
                ("MODEL_ID", None),
                ("ANTHROPIC_BASE_URL", None),
                ("MODEL_MAX_TOKENS", None),
                ("MODEL_TIMEOUT_SECS", None),
                ("TARGET_ROLE_ARN", None),
                ("ROLE_SESSION_DURATION_SECS", None),
                ("AWS_DEFAULT_REGION", None),
                ("AGENT_MAX_STEPS", None),
                ("TOOL_CALL_TIMEOUT_SECS", None),
                ("BILLING_MCP_URL", None),
                ("AWS_API_MCP_URL", None),
                ("ENABLE_AWS_API_SERVER", None),
            ],
            || {
                let config = AgentConfig::from_env().unwrap();
                assert_eq!(config.model_id, DEFAULT_MODEL_ID);
                assert_eq!(config.anthropic_base_url, "https://api.anthropic.com");
                assert_eq!(config.model_max_tokens, 8192);
                assert_eq!(config.model_timeout_secs, 120);
                assert!(config.target_role_arn.is_none());
                assert_eq!(config.role_session_duration_secs, 3600);
                assert_eq!(config.aws_region, "us-east-1");
                assert_eq!(config.max_steps, 10);
                assert_eq!(config.tool_call_timeout_secs, 60);
                assert!(config.enable_aws_api_server);
            },
        );
    }

    #[test]
    fn test_api_key_is_required() {
        temp_env::with_var_unset("ANTHROPIC_API_KEY", || {
            let result = AgentConfig::from_env();
            assert!(result.is_err());
            assert!(result.unwrap_err().to_string().contains("ANTHROPIC_API_KEY"));
        });
    }

    #[test]
    fn test_role_arn_and_overrides() {
        temp_env::with_vars(
            [
                ("ANTHROPIC_API_KEY", Some("test-key")),
                (
                    "TARGET_ROLE_ARN",
                    Some("arn:aws:iam::123456789012:role/finops"),
                ),
                ("AGENT_MAX_STEPS", Some("3")),
                ("ROLE_SESSION_DURATION_SECS", Some("900")),
                ("ENABLE_AWS_API_SERVER", Some("false")),
            ],
            || {
                let config = AgentConfig::from_env().unwrap();
                assert_eq!(
                    config.target_role_arn.as_deref(),
                    Some("arn:aws:iam::123456789012:role/finops")
                );
                assert_eq!(config.max_steps, 3);
                assert_eq!(config.role_session_duration_secs, 900);
                assert!(!config.enable_aws_api_server);
            },
        );
    }

    #[test]
    fn test_blank_role_arn_means_native_scope() {
        temp_env::with_vars(
            [
                ("ANTHROPIC_API_KEY", Some("test-key")),
                ("TARGET_ROLE_ARN", Some("  ")),
            ],
            || {
                let config = AgentConfig::from_env().unwrap();
                assert!(config.target_role_arn.is_none());
            },
        );
    }

    #[test]
    fn test_invalid_number_is_a_parse_error() {
        temp_env::with_vars(
            [
                ("ANTHROPIC_API_KEY", Some("test-key")),
                ("AGENT_MAX_STEPS", Some("many")),
            ],
            || {
                let result = AgentConfig::from_env();
                assert!(result.is_err());
                assert!(result.unwrap_err().to_string().contains("AGENT_MAX_STEPS"));
            },
        );
    }
}
