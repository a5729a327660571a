//! Secret store interface and the credential-document adapter built on it

use crate::document::{CredentialDocument, DocumentKind};
use crate::{Result, RotationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Stage labels the managed store attaches to secret versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VersionStage {
    #[serde(rename = "AWSCURRENT")]
    Current,
    #[serde(rename = "AWSPENDING")]
    Pending,
    #[serde(rename = "AWSPREVIOUS")]
    Previous,
}

impl VersionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionStage::Current => "AWSCURRENT",
            VersionStage::Pending => "AWSPENDING",
            VersionStage::Previous => "AWSPREVIOUS",
        }
    }
}

impl fmt::Display for VersionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VersionStage {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AWSCURRENT" => Ok(VersionStage::Current),
            "AWSPENDING" => Ok(VersionStage::Pending),
            "AWSPREVIOUS" => Ok(VersionStage::Previous),
            other => Err(RotationError::Validation(format!("unknown version stage {}", other))),
        }
    }
}

/// A single version's payload as returned by the store.
#[derive(Clone)]
pub struct SecretValue {
    pub arn: Option<String>,
    pub version_id: String,
    pub payload: String,
    pub stages: Vec<String>,
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("arn", &self.arn)
            .field("version_id", &self.version_id)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

/// Rotation-relevant metadata for a secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretDescription {
    pub arn: Option<String>,
    pub name: Option<String>,
    /// `None` when the store does not report the flag at all.
    pub rotation_enabled: Option<bool>,
    /// Function invoked for each rotation step, once rotation has been enabled.
    pub rotation_function_arn: Option<String>,
    pub rotation_schedule: Option<RotationSchedule>,
    pub versions_to_stages: BTreeMap<String, Vec<String>>,
}

impl SecretDescription {
    pub fn stages_for(&self, version_id: &str) -> Option<&[String]> {
        self.versions_to_stages.get(version_id).map(Vec::as_slice)
    }

    pub fn has_stage(&self, version_id: &str, stage: VersionStage) -> bool {
        self.stages_for(version_id)
            .is_some_and(|stages| stages.iter().any(|s| s == stage.as_str()))
    }

    /// The version currently holding `stage`, if any.
    pub fn version_with_stage(&self, stage: VersionStage) -> Option<&str> {
        self.versions_to_stages
            .iter()
            .find(|(_, stages)| stages.iter().any(|s| s == stage.as_str()))
            .map(|(version, _)| version.as_str())
    }
}

/// Identity returned by create/delete calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretHandle {
    pub arn: Option<String>,
    pub name: Option<String>,
    pub version_id: Option<String>,
    pub deletion_date: Option<chrono::DateTime<chrono::Utc>>,
}

/// Schedule attached to a secret when rotation is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSchedule {
    pub schedule_expression: String,
    pub duration: Option<String>,
}

impl Default for RotationSchedule {
    fn default() -> Self {
        Self {
            schedule_expression: "cron(0 16 1,15 * ? *)".to_string(),
            duration: Some("2h".to_string()),
        }
    }
}

/// Versioned key-value store with stage labels.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Fetch the version labelled `stage`, optionally requiring it to be `version_id`.
    /// Returns `Ok(None)` if no such version exists.
    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> Result<Option<SecretValue>>;

    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        payload: &str,
        stages: &[VersionStage],
    ) -> Result<()>;

    async fn describe_secret(&self, secret_id: &str) -> Result<SecretDescription>;

    /// Move `stage` to `move_to_version`, taking it from `remove_from_version`
    /// in the same call.
    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to_version: &str,
        remove_from_version: Option<&str>,
    ) -> Result<()>;

    async fn create_secret(
        &self,
        name: &str,
        payload: &str,
        description: Option<&str>,
    ) -> Result<SecretHandle>;

    async fn delete_secret(&self, secret_id: &str, force_immediate: bool) -> Result<SecretHandle>;

    /// Enable scheduled rotation by `rotation_function_arn`.
    async fn rotate_secret(
        &self,
        secret_id: &str,
        rotation_function_arn: &str,
        schedule: &RotationSchedule,
    ) -> Result<SecretHandle>;
}

/// Read and validate the document at `stage`.
pub async fn read_secret(
    store: &dyn SecretStore,
    secret_id: &str,
    stage: VersionStage,
    version_id: Option<&str>,
    kind: DocumentKind,
) -> Result<CredentialDocument> {
    find_secret(store, secret_id, stage, version_id, kind)
        .await?
        .ok_or_else(|| {
            RotationError::NotFound(match version_id {
                Some(version) => format!("secret {} has no version {} at stage {}", secret_id, version, stage),
                None => format!("secret {} has no version at stage {}", secret_id, stage),
            })
        })
}

/// Like [`read_secret`], but a missing version is `Ok(None)`.
pub async fn find_secret(
    store: &dyn SecretStore,
    secret_id: &str,
    stage: VersionStage,
    version_id: Option<&str>,
    kind: DocumentKind,
) -> Result<Option<CredentialDocument>> {
    let Some(value) = store.get_secret_value(secret_id, stage, version_id).await? else {
        return Ok(None);
    };

    debug!(secret_id = %secret_id, stage = %stage, version = %value.version_id, "Fetched secret value");
    CredentialDocument::parse(&value.payload, kind).map(Some)
}

pub async fn write_secret_version(
    store: &dyn SecretStore,
    secret_id: &str,
    version_id: &str,
    document: &CredentialDocument,
    stages: &[VersionStage],
) -> Result<()> {
    let payload = document.to_json()?;
    store.put_secret_value(secret_id, version_id, &payload, stages).await?;
    info!(secret_id = %secret_id, version = %version_id, "Wrote secret version");
    Ok(())
}

/// Move `AWSCURRENT` from `from_version` to `to_version` in one store call.
pub async fn promote_version(
    store: &dyn SecretStore,
    secret_id: &str,
    from_version: Option<&str>,
    to_version: &str,
) -> Result<()> {
    store
        .update_version_stage(secret_id, VersionStage::Current, to_version, from_version)
        .await?;
    info!(
        secret_id = %secret_id,
        version = %to_version,
        previous = ?from_version,
        "Promoted version to AWSCURRENT"
    );
    Ok(())
}
