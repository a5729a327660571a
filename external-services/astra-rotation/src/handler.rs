//! Rotation entry point
//!
//! Validates an incoming rotation event against the secret's staging
//! metadata and dispatches it to the matching [`Rotator`] step.

use crate::audit::{AuditEvent, AuditEventType};
use crate::rotation::{RotationStep, Rotator, StepOutcome};
use crate::store::VersionStage;
use crate::{Result, RotationError};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Event delivered by the secret store's rotation scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationEvent {
    #[serde(rename = "SecretId")]
    pub secret_id: String,

    #[serde(rename = "ClientRequestToken")]
    pub client_request_token: String,

    /// Step name; parsed only after the version's staging is validated.
    #[serde(rename = "Step")]
    pub step: String,
}

impl RotationEvent {
    pub fn new(secret_id: &str, token: &str, step: RotationStep) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            client_request_token: token.to_string(),
            step: step.as_str().to_string(),
        }
    }
}

pub struct RotationHandler {
    rotator: Rotator,
}

impl RotationHandler {
    pub fn new(rotator: Rotator) -> Self {
        Self { rotator }
    }

    pub fn rotator(&self) -> &Rotator {
        &self.rotator
    }

    pub async fn handle(&self, event: &RotationEvent) -> Result<StepOutcome> {
        let secret_id = event.secret_id.as_str();
        let token = event.client_request_token.as_str();

        let result = self.dispatch(secret_id, token, &event.step).await;
        if let Err(e) = &result {
            error!(
                secret_id = %secret_id,
                version = %token,
                step = %event.step,
                error = %e,
                retryable = e.is_retryable(),
                "Rotation step failed"
            );
            self.rotator.audit().log_event(
                AuditEvent::new(AuditEventType::StepFailed, secret_id)
                    .with_version(token)
                    .failed(e),
            );
        }
        result
    }

    async fn dispatch(&self, secret_id: &str, token: &str, step: &str) -> Result<StepOutcome> {
        let description = self.rotator.store().describe_secret(secret_id).await?;

        if description.rotation_enabled == Some(false) {
            return Err(RotationError::RotationNotEnabled(format!(
                "Secret {} is not enabled for rotation",
                secret_id
            )));
        }

        if description.stages_for(token).is_none() {
            return Err(RotationError::Validation(format!(
                "Secret version {} has no stage for rotation of secret {}.",
                token, secret_id
            )));
        }

        if description.has_stage(token, VersionStage::Current) {
            info!(secret_id = %secret_id, version = %token, "Secret version already set as AWSCURRENT");
            return Ok(StepOutcome::AlreadyApplied);
        }

        if !description.has_stage(token, VersionStage::Pending) {
            return Err(RotationError::Validation(format!(
                "Secret version {} not set as AWSPENDING for rotation of secret {}.",
                token, secret_id
            )));
        }

        let step: RotationStep = step.parse()?;
        self.rotator.run_step(step, secret_id, token).await
    }
}
