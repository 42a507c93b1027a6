//! Credential resolution for tool invocations.
//!
//! The resolver produces an immutable [`CredentialHandle`] that tool
//! calls run under. With no role configured the handle is native scope
//! and the backends use their own ambient chain. With a role ARN the
//! handle carries STS session credentials; refresh produces a new
//! handle swapped in atomically while in-flight calls keep the handle
//! they were issued.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
#[cfg(test)]
use mockall::automock;
use observability::AgentMetrics;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::{AssistantError, AssistantResult};
use crate::models::AccountScope;

/// Role session name used for every STS exchange
pub const ROLE_SESSION_NAME: &str = "finops-chatbot-session";

/// Refresh when the handle expires within this margin
const REFRESH_MARGIN_SECS: i64 = 300;

/// Temporary AWS credentials forwarded to backends for assumed scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

/// Immutable credential handle; never mutated in place
#[derive(Debug, Clone)]
pub struct CredentialHandle {
    pub scope: AccountScope,
    pub role_arn: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub credentials: Option<SessionCredentials>,
}

impl CredentialHandle {
    pub fn native() -> Self {
        Self {
            scope: AccountScope::Native,
            role_arn: None,
            expires_at: None,
            credentials: None,
        }
    }

    pub fn assumed(
        role_arn: impl Into<String>,
        credentials: SessionCredentials,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scope: AccountScope::Assumed,
            role_arn: Some(role_arn.into()),
            expires_at: Some(expires_at),
            credentials: Some(credentials),
        }
    }

    /// Whether the handle expires within the refresh margin. Native
    /// handles never expire.
    pub fn is_near_expiry(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Utc::now() <= Duration::seconds(margin_secs),
            None => false,
        }
    }
}

/// Result of one STS assume-role exchange
#[derive(Debug, Clone)]
pub struct AssumedRole {
    pub credentials: SessionCredentials,
    pub expires_at: DateTime<Utc>,
}

/// Seam for the STS exchange
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration_secs: i32,
    ) -> AssistantResult<AssumedRole>;
}

/// STS-backed role assumer using the ambient credential chain
pub struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
}

impl StsRoleAssumer {
    /// Build the STS client from environment configuration
    pub async fn from_env(region: &str) -> Self {
        let config = aws_config::from_env()
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: aws_sdk_sts::Client::new(&config),
        }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration_secs: i32,
    ) -> AssistantResult<AssumedRole> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(duration_secs)
            .send()
            .await
            .map_err(|e| AssistantError::Credential(format!("assume-role failed: {e}")))?;

        let creds = output.credentials.ok_or_else(|| {
            AssistantError::Credential("assume-role response missing credentials".to_string())
        })?;

        let expires_at = Utc
            .timestamp_opt(creds.expiration.secs(), 0)
            .single()
            .ok_or_else(|| {
                AssistantError::Credential("assume-role returned an invalid expiry".to_string())
            })?;

        Ok(AssumedRole {
            credentials: SessionCredentials {
                access_key_id: creds.access_key_id,
                secret_access_key: creds.secret_access_key,
                session_token: creds.session_token,
            },
            expires_at,
        })
    }
}

/// Produces and refreshes the process-wide credential handle.
///
/// At most one refresh is in flight at a time; concurrent callers await
/// the winner's result. When a role is configured a failed exchange is
/// surfaced as a [`AssistantError::Credential`], never a silent
/// fallback to native scope.
pub struct CredentialResolver {
    assumer: Arc<dyn RoleAssumer>,
    role_arn: Option<String>,
    session_duration_secs: i32,
    current: RwLock<Option<Arc<CredentialHandle>>>,
    refresh_gate: Mutex<()>,
}

impl CredentialResolver {
    pub fn new(
        assumer: Arc<dyn RoleAssumer>,
        role_arn: Option<String>,
        session_duration_secs: i32,
    ) -> Self {
        Self {
            assumer,
            role_arn,
            session_duration_secs,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// The handle currently swapped in, if any
    pub async fn current(&self) -> Option<Arc<CredentialHandle>> {
        self.current.read().await.clone()
    }

    /// Full resolution; run at startup and whenever no handle exists
    pub async fn resolve(&self) -> AssistantResult<Arc<CredentialHandle>> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Refresh entry point used before tool dispatch.
    ///
    /// Idempotent when the handle is not near expiry: no STS call, the
    /// current handle is returned unchanged.
    pub async fn ensure_fresh(&self) -> AssistantResult<Arc<CredentialHandle>> {
        if let Some(handle) = self.current().await {
            if !handle.is_near_expiry(REFRESH_MARGIN_SECS) {
                return Ok(handle);
            }
        }

        let _gate = self.refresh_gate.lock().await;
        // Re-check: a concurrent caller may have won the refresh
        if let Some(handle) = self.current().await {
            if !handle.is_near_expiry(REFRESH_MARGIN_SECS) {
                return Ok(handle);
            }
        }
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> AssistantResult<Arc<CredentialHandle>> {
        let handle = match &self.role_arn {
            None => Arc::new(CredentialHandle::native()),
            Some(role_arn) => {
                info!(role_arn = %role_arn, "Assuming cross-account role");
                let assumed = self
                    .assumer
                    .assume_role(role_arn, ROLE_SESSION_NAME, self.session_duration_secs)
                    .await
                    .inspect_err(|e| {
                        AgentMetrics::record_credential_refresh("failed");
                        warn!(role_arn = %role_arn, error = %e, "Role assumption failed");
                    })?;
                AgentMetrics::record_credential_refresh("ok");
                Arc::new(CredentialHandle::assumed(
                    role_arn.clone(),
                    assumed.credentials,
                    assumed.expires_at,
                ))
            }
        };

        *self.current.write().await = Some(Arc::clone(&handle));
        Ok(handle)
    }
}
