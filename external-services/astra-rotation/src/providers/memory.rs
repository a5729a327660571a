//! Process-local secret store with managed-store stage semantics

use async_trait::async_trait;
use crate::store::{
    RotationSchedule, SecretDescription, SecretHandle, SecretStore, SecretValue, VersionStage,
};
use crate::{Result, RotationError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Default)]
struct VersionEntry {
    /// `None` for a placeholder staged by `rotate_secret` before any payload is written.
    payload: Option<String>,
    stages: BTreeSet<VersionStage>,
}

#[derive(Debug, Default)]
struct SecretEntry {
    rotation_enabled: Option<bool>,
    rotation_function_arn: Option<String>,
    schedule: Option<RotationSchedule>,
    versions: BTreeMap<String, VersionEntry>,
}

impl SecretEntry {
    fn take_stage(&mut self, stage: VersionStage) {
        for version in self.versions.values_mut() {
            version.stages.remove(&stage);
        }
    }

    fn holder_of(&self, stage: VersionStage) -> Option<String> {
        self.versions
            .iter()
            .find(|(_, v)| v.stages.contains(&stage))
            .map(|(id, _)| id.clone())
    }
}

/// In-memory [`SecretStore`].
///
/// Every operation runs under a single lock, so a stage move is observed
/// either fully applied or not at all.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: Mutex<HashMap<String, SecretEntry>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `secret_id` with an `AWSCURRENT` version holding `payload`.
    pub fn insert_current(&self, secret_id: &str, version_id: &str, payload: &str) {
        let mut secrets = self.secrets.lock();
        let entry = secrets.entry(secret_id.to_string()).or_default();
        entry.take_stage(VersionStage::Current);
        entry.versions.insert(
            version_id.to_string(),
            VersionEntry {
                payload: Some(payload.to_string()),
                stages: BTreeSet::from([VersionStage::Current]),
            },
        );
    }

    /// Stage an empty `AWSPENDING` version, as the managed store does when a
    /// rotation starts.
    pub fn stage_pending(&self, secret_id: &str, version_id: &str) -> Result<()> {
        let mut secrets = self.secrets.lock();
        let entry = secrets
            .get_mut(secret_id)
            .ok_or_else(|| RotationError::NotFound(secret_id.to_string()))?;
        entry.take_stage(VersionStage::Pending);
        entry
            .versions
            .entry(version_id.to_string())
            .or_default()
            .stages
            .insert(VersionStage::Pending);
        Ok(())
    }

    pub fn set_rotation_enabled(&self, secret_id: &str, enabled: Option<bool>) {
        if let Some(entry) = self.secrets.lock().get_mut(secret_id) {
            entry.rotation_enabled = enabled;
        }
    }

    /// Raw payload of a version regardless of stage.
    pub fn payload(&self, secret_id: &str, version_id: &str) -> Option<String> {
        self.secrets
            .lock()
            .get(secret_id)
            .and_then(|entry| entry.versions.get(version_id))
            .and_then(|version| version.payload.clone())
    }

    pub fn contains(&self, secret_id: &str) -> bool {
        self.secrets.lock().contains_key(secret_id)
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> Result<Option<SecretValue>> {
        let secrets = self.secrets.lock();
        let Some(entry) = secrets.get(secret_id) else {
            return Ok(None);
        };

        let found = entry.versions.iter().find(|(id, version)| {
            version.stages.contains(&stage) && version_id.map_or(true, |wanted| wanted == id.as_str())
        });

        Ok(found.and_then(|(id, version)| {
            version.payload.as_ref().map(|payload| SecretValue {
                arn: Some(secret_id.to_string()),
                version_id: id.clone(),
                payload: payload.clone(),
                stages: version.stages.iter().map(|s| s.as_str().to_string()).collect(),
            })
        }))
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        payload: &str,
        stages: &[VersionStage],
    ) -> Result<()> {
        let mut secrets = self.secrets.lock();
        let entry = secrets
            .get_mut(secret_id)
            .ok_or_else(|| RotationError::NotFound(secret_id.to_string()))?;

        if let Some(existing) = entry.versions.get(version_id) {
            if existing.payload.as_deref().is_some_and(|p| p != payload) {
                return Err(RotationError::ProviderError(format!(
                    "version {} of {} already exists with different content",
                    version_id, secret_id
                )));
            }
        }

        for stage in stages {
            entry.take_stage(*stage);
        }

        let version = entry.versions.entry(version_id.to_string()).or_default();
        version.payload = Some(payload.to_string());
        version.stages.extend(stages.iter().copied());

        debug!(secret_id = %secret_id, version = %version_id, "Stored secret version in memory");
        Ok(())
    }

    async fn describe_secret(&self, secret_id: &str) -> Result<SecretDescription> {
        let secrets = self.secrets.lock();
        let entry = secrets
            .get(secret_id)
            .ok_or_else(|| RotationError::NotFound(format!("secret {} does not exist", secret_id)))?;

        Ok(SecretDescription {
            arn: Some(secret_id.to_string()),
            name: Some(secret_id.to_string()),
            rotation_enabled: entry.rotation_enabled,
            rotation_function_arn: entry.rotation_function_arn.clone(),
            rotation_schedule: entry.schedule.clone(),
            versions_to_stages: entry
                .versions
                .iter()
                .filter(|(_, v)| !v.stages.is_empty())
                .map(|(id, v)| (id.clone(), v.stages.iter().map(|s| s.as_str().to_string()).collect()))
                .collect(),
        })
    }

    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to_version: &str,
        remove_from_version: Option<&str>,
    ) -> Result<()> {
        let mut secrets = self.secrets.lock();
        let entry = secrets
            .get_mut(secret_id)
            .ok_or_else(|| RotationError::NotFound(secret_id.to_string()))?;

        if !entry.versions.contains_key(move_to_version) {
            return Err(RotationError::NotFound(format!(
                "secret {} has no version {}",
                secret_id, move_to_version
            )));
        }

        let holder = entry.holder_of(stage);
        if holder.as_deref() != remove_from_version && holder.as_deref() != Some(move_to_version) {
            return Err(RotationError::ProviderError(format!(
                "{} is attached to {:?}, not {:?}",
                stage, holder, remove_from_version
            )));
        }

        entry.take_stage(stage);
        if let Some(target) = entry.versions.get_mut(move_to_version) {
            target.stages.insert(stage);
            if stage == VersionStage::Current {
                target.stages.remove(&VersionStage::Pending);
            }
        }

        if stage == VersionStage::Current {
            if let Some(previous) = holder.filter(|h| h != move_to_version) {
                entry.take_stage(VersionStage::Previous);
                if let Some(version) = entry.versions.get_mut(&previous) {
                    version.stages.insert(VersionStage::Previous);
                }
            }
        }

        Ok(())
    }

    async fn create_secret(
        &self,
        name: &str,
        payload: &str,
        _description: Option<&str>,
    ) -> Result<SecretHandle> {
        let mut secrets = self.secrets.lock();
        if secrets.contains_key(name) {
            return Err(RotationError::ProviderError(format!("secret {} already exists", name)));
        }

        let version_id = uuid::Uuid::new_v4().to_string();
        let mut entry = SecretEntry::default();
        entry.versions.insert(
            version_id.clone(),
            VersionEntry {
                payload: Some(payload.to_string()),
                stages: BTreeSet::from([VersionStage::Current]),
            },
        );
        secrets.insert(name.to_string(), entry);

        Ok(SecretHandle {
            arn: Some(name.to_string()),
            name: Some(name.to_string()),
            version_id: Some(version_id),
            deletion_date: None,
        })
    }

    async fn delete_secret(&self, secret_id: &str, _force_immediate: bool) -> Result<SecretHandle> {
        self.secrets
            .lock()
            .remove(secret_id)
            .ok_or_else(|| RotationError::NotFound(secret_id.to_string()))?;

        Ok(SecretHandle {
            arn: Some(secret_id.to_string()),
            name: Some(secret_id.to_string()),
            version_id: None,
            deletion_date: Some(chrono::Utc::now()),
        })
    }

    async fn rotate_secret(
        &self,
        secret_id: &str,
        rotation_function_arn: &str,
        schedule: &RotationSchedule,
    ) -> Result<SecretHandle> {
        let version_id = uuid::Uuid::new_v4().to_string();
        {
            let mut secrets = self.secrets.lock();
            let entry = secrets
                .get_mut(secret_id)
                .ok_or_else(|| RotationError::NotFound(secret_id.to_string()))?;
            entry.rotation_enabled = Some(true);
            entry.rotation_function_arn = Some(rotation_function_arn.to_string());
            entry.schedule = Some(schedule.clone());
        }
        self.stage_pending(secret_id, &version_id)?;

        Ok(SecretHandle {
            arn: Some(secret_id.to_string()),
            name: Some(secret_id.to_string()),
            version_id: Some(version_id),
            deletion_date: None,
        })
    }
}
