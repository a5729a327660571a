//! The four-step rotation protocol
//!
//! Each step is invoked independently by the secret store's rotation
//! scheduler and runs to completion or failure. No state is kept between
//! invocations: every step re-reads what it needs from the store, including
//! the root credential, which may have been rotated in the meantime.

use crate::astra::TokenAuthority;
use crate::audit::{AuditEvent, AuditEventType, AuditLogger};
use crate::document::{CredentialDocument, DocumentKind};
use crate::store::{self, SecretStore, VersionStage};
use crate::{Result, RotationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationStep {
    #[serde(rename = "createSecret")]
    CreateSecret,
    #[serde(rename = "setSecret")]
    SetSecret,
    #[serde(rename = "testSecret")]
    TestSecret,
    #[serde(rename = "finishSecret")]
    FinishSecret,
}

impl RotationStep {
    /// Steps in protocol order.
    pub const ALL: [RotationStep; 4] = [
        RotationStep::CreateSecret,
        RotationStep::SetSecret,
        RotationStep::TestSecret,
        RotationStep::FinishSecret,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RotationStep::CreateSecret => "createSecret",
            RotationStep::SetSecret => "setSecret",
            RotationStep::TestSecret => "testSecret",
            RotationStep::FinishSecret => "finishSecret",
        }
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RotationStep {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        RotationStep::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| RotationError::Validation(format!("Invalid step parameter {}", s)))
    }
}

/// What a step invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step performed its side effects.
    Completed,
    /// An earlier invocation already did the work; nothing was changed.
    AlreadyApplied,
    /// The step has nothing to do for this credential type.
    NoOp,
}

/// Runs rotation steps against a secret store and the token authority.
pub struct Rotator {
    store: Arc<dyn SecretStore>,
    authority: Arc<dyn TokenAuthority>,
    audit: AuditLogger,
}

impl Rotator {
    pub fn new(store: Arc<dyn SecretStore>, authority: Arc<dyn TokenAuthority>) -> Self {
        Self {
            store,
            authority,
            audit: AuditLogger::default(),
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &dyn SecretStore {
        self.store.as_ref()
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub async fn run_step(&self, step: RotationStep, secret_id: &str, token: &str) -> Result<StepOutcome> {
        debug!(secret_id = %secret_id, version = %token, step = %step, "Running rotation step");
        match step {
            RotationStep::CreateSecret => self.create_secret(secret_id, token).await,
            RotationStep::SetSecret => self.set_secret(secret_id, token).await,
            RotationStep::TestSecret => self.test_secret(secret_id, token).await,
            RotationStep::FinishSecret => self.finish_secret(secret_id, token).await,
        }
    }

    /// Issue a replacement client token and stage it as `AWSPENDING` under `token`.
    pub async fn create_secret(&self, secret_id: &str, token: &str) -> Result<StepOutcome> {
        let current = self.current_document(secret_id).await?;
        let root_key = self.root_key(&current).await?;

        let existing = store::find_secret(
            self.store(),
            secret_id,
            VersionStage::Pending,
            Some(token),
            DocumentKind::Derived,
        )
        .await?;
        if existing.is_some() {
            info!(secret_id = %secret_id, version = %token, "createSecret: pending version already exists");
            self.audit.log_event(
                AuditEvent::new(AuditEventType::StepSkipped, secret_id).with_version(token),
            );
            return Ok(StepOutcome::AlreadyApplied);
        }

        let roles = self.authority.list_roles(&root_key, &current.client_id).await?;
        debug!(client_id = %current.client_id, roles = roles.len(), "Fetched roles for current client");

        let issued = self
            .authority
            .create_token(&root_key, &roles)
            .await
            .map_err(|e| match e {
                RotationError::TokenCreation(_) => e,
                other => RotationError::TokenCreation(format!(
                    "unable to create replacement token for {}: {}",
                    current.client_id, other
                )),
            })?;
        info!(
            secret_id = %secret_id,
            client_id = %issued.client_id,
            replaces = %current.client_id,
            "Created replacement token"
        );
        self.audit.log_event(
            AuditEvent::new(AuditEventType::TokenCreated, secret_id)
                .with_version(token)
                .with_client_id(&issued.client_id),
        );

        let pending = current.with_client_token(&issued);
        store::write_secret_version(self.store(), secret_id, token, &pending, &[VersionStage::Pending]).await?;
        self.audit.log_event(
            AuditEvent::new(AuditEventType::PendingVersionWritten, secret_id)
                .with_version(token)
                .with_client_id(&pending.client_id),
        );

        Ok(StepOutcome::Completed)
    }

    /// The token authority has no install phase, so there is nothing to set.
    pub async fn set_secret(&self, secret_id: &str, token: &str) -> Result<StepOutcome> {
        debug!(secret_id = %secret_id, version = %token, "setSecret: nothing to do");
        Ok(StepOutcome::NoOp)
    }

    /// Authenticate against the token authority with the pending key.
    pub async fn test_secret(&self, secret_id: &str, token: &str) -> Result<StepOutcome> {
        let pending = store::read_secret(
            self.store(),
            secret_id,
            VersionStage::Pending,
            Some(token),
            DocumentKind::Derived,
        )
        .await?;

        let result = match self.authority.current_org(&pending.astra_key).await {
            Ok(response) if response.status_code() == 200 => Ok(()),
            Ok(response) => Err(RotationError::CredentialTestFailed {
                status: Some(response.status_code()),
                detail: response.body_text(),
            }),
            Err(e) => Err(RotationError::CredentialTestFailed {
                status: None,
                detail: e.to_string(),
            }),
        };

        let event = AuditEvent::new(AuditEventType::CredentialTested, secret_id)
            .with_version(token)
            .with_client_id(&pending.client_id);

        match result {
            Ok(()) => {
                info!(secret_id = %secret_id, version = %token, "Successfully tested pending token");
                self.audit.log_event(event);
                Ok(StepOutcome::Completed)
            }
            Err(e) => {
                self.audit.log_event(event.failed(&e));
                Err(e)
            }
        }
    }

    /// Revoke the superseded client token, then promote `token` to `AWSCURRENT`.
    ///
    /// Promotion never happens unless revocation succeeded, so a failure here
    /// leaves the old credential current and valid.
    pub async fn finish_secret(&self, secret_id: &str, token: &str) -> Result<StepOutcome> {
        let current = self.current_document(secret_id).await?;
        let root_key = self.root_key(&current).await?;

        let status = self.authority.delete_token(&root_key, &current.client_id).await?;
        if status != 200 && status != 204 {
            let err = RotationError::TokenDeletionFailed {
                client_id: current.client_id.clone(),
                status,
            };
            self.audit.log_event(
                AuditEvent::new(AuditEventType::TokenRevoked, secret_id)
                    .with_version(token)
                    .with_client_id(&current.client_id)
                    .failed(&err),
            );
            return Err(err);
        }
        info!(secret_id = %secret_id, client_id = %current.client_id, "Deleted old token");
        self.audit.log_event(
            AuditEvent::new(AuditEventType::TokenRevoked, secret_id)
                .with_version(token)
                .with_client_id(&current.client_id),
        );

        let description = self.store.describe_secret(secret_id).await?;
        let current_version = description.version_with_stage(VersionStage::Current);
        if current_version == Some(token) {
            warn!(secret_id = %secret_id, version = %token, "finishSecret: version already marked as AWSCURRENT");
            return Ok(StepOutcome::AlreadyApplied);
        }

        store::promote_version(self.store(), secret_id, current_version, token).await?;
        self.audit.log_event(
            AuditEvent::new(AuditEventType::VersionPromoted, secret_id).with_version(token),
        );

        Ok(StepOutcome::Completed)
    }

    async fn current_document(&self, secret_id: &str) -> Result<CredentialDocument> {
        store::read_secret(self.store(), secret_id, VersionStage::Current, None, DocumentKind::Derived).await
    }

    /// Root key for `document`, read fresh from the store on every call.
    async fn root_key(&self, document: &CredentialDocument) -> Result<String> {
        let root_arn = document.root_arn()?;
        let root = store::read_secret(self.store(), root_arn, VersionStage::Current, None, DocumentKind::Root).await?;
        Ok(root.astra_key)
    }
}
