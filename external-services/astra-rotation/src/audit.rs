//! Audit logging for rotation steps

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub secret_id: String,
    pub version: Option<String>,
    pub client_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TokenCreated,
    TokenRevoked,
    PendingVersionWritten,
    CredentialTested,
    VersionPromoted,
    StepSkipped,
    StepFailed,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, secret_id: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            secret_id: secret_id.to_string(),
            version: None,
            client_id: None,
            success: true,
            error_message: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn failed(mut self, error: &impl std::fmt::Display) -> Self {
        self.success = false;
        self.error_message = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditLogger {
    enabled: bool,
}

impl AuditLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_event(&self, event: AuditEvent) {
        if !self.enabled {
            return;
        }

        if event.success {
            info!(
                target: "audit",
                event_type = ?event.event_type,
                secret_id = %event.secret_id,
                version = ?event.version,
                client_id = ?event.client_id,
                timestamp = %event.timestamp.to_rfc3339(),
                "Audit event"
            );
        } else {
            warn!(
                target: "audit",
                event_type = ?event.event_type,
                secret_id = %event.secret_id,
                version = ?event.version,
                client_id = ?event.client_id,
                timestamp = %event.timestamp.to_rfc3339(),
                error = ?event.error_message,
                "Audit event failed"
            );
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(true)
    }
}
