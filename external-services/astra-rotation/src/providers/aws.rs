//! AWS Secrets Manager provider implementation

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::types::RotationRulesType;
use aws_sdk_secretsmanager::Client;
use crate::config::AwsSecretsManagerConfig;
use crate::store::{
    RotationSchedule, SecretDescription, SecretHandle, SecretStore, SecretValue, VersionStage,
};
use crate::{Result, RotationError};
use std::collections::BTreeMap;
use tracing::debug;

const NOT_FOUND_CODE: &str = "ResourceNotFoundException";

pub struct AwsSecretsManagerStore {
    client: Client,
}

impl AwsSecretsManagerStore {
    pub async fn new(config: &AwsSecretsManagerConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = config.region.clone() {
            loader = loader.region(aws_sdk_secretsmanager::config::Region::new(region));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_secretsmanager::config::Builder::from(&sdk_config);
        if let Some(endpoint) = config.endpoint_url.as_deref() {
            debug!(endpoint = %endpoint, "Using Secrets Manager endpoint override");
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self::from_client(Client::from_conf(builder.build())))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn is_not_found<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    if let SdkError::ServiceError(context) = err {
        return context.err().code() == Some(NOT_FOUND_CODE);
    }
    false
}

fn provider_error<E, R>(operation: &str, err: SdkError<E, R>) -> RotationError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    RotationError::ProviderError(format!(
        "AWS Secrets Manager {} failed: {}",
        operation,
        DisplayErrorContext(err)
    ))
}

fn map_error<E, R>(operation: &str, secret_id: &str, err: SdkError<E, R>) -> RotationError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if is_not_found(&err) {
        RotationError::NotFound(secret_id.to_string())
    } else {
        provider_error(operation, err)
    }
}

fn to_chrono(date: &aws_sdk_secretsmanager::primitives::DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(date.secs(), date.subsec_nanos())
}

#[async_trait]
impl SecretStore for AwsSecretsManagerStore {
    fn name(&self) -> &str {
        "aws-secrets-manager"
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: VersionStage,
        version_id: Option<&str>,
    ) -> Result<Option<SecretValue>> {
        debug!(secret_id = %secret_id, stage = %stage, "Getting secret value from AWS Secrets Manager");

        let response = match self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage(stage.as_str())
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(provider_error("GetSecretValue", e)),
        };

        let payload = response
            .secret_string()
            .ok_or_else(|| {
                RotationError::MalformedSecret(format!("secret {} has no string value", secret_id))
            })?
            .to_string();

        Ok(Some(SecretValue {
            arn: response.arn().map(str::to_string),
            version_id: response.version_id().unwrap_or_default().to_string(),
            payload,
            stages: response.version_stages().to_vec(),
        }))
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        payload: &str,
        stages: &[VersionStage],
    ) -> Result<()> {
        debug!(secret_id = %secret_id, version = %version_id, "Putting secret value in AWS Secrets Manager");

        self.client
            .put_secret_value()
            .secret_id(secret_id)
            .client_request_token(version_id)
            .secret_string(payload)
            .set_version_stages(Some(stages.iter().map(|s| s.as_str().to_string()).collect()))
            .send()
            .await
            .map_err(|e| map_error("PutSecretValue", secret_id, e))?;

        Ok(())
    }

    async fn describe_secret(&self, secret_id: &str) -> Result<SecretDescription> {
        let response = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| map_error("DescribeSecret", secret_id, e))?;

        let versions_to_stages: BTreeMap<String, Vec<String>> = response
            .version_ids_to_stages()
            .map(|versions| {
                versions
                    .iter()
                    .map(|(version, stages)| (version.clone(), stages.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(SecretDescription {
            arn: response.arn().map(str::to_string),
            name: response.name().map(str::to_string),
            rotation_enabled: response.rotation_enabled(),
            rotation_function_arn: response.rotation_lambda_arn().map(str::to_string),
            rotation_schedule: response.rotation_rules().and_then(|rules| {
                rules.schedule_expression().map(|expression| RotationSchedule {
                    schedule_expression: expression.to_string(),
                    duration: rules.duration().map(str::to_string),
                })
            }),
            versions_to_stages,
        })
    }

    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to_version: &str,
        remove_from_version: Option<&str>,
    ) -> Result<()> {
        self.client
            .update_secret_version_stage()
            .secret_id(secret_id)
            .version_stage(stage.as_str())
            .move_to_version_id(move_to_version)
            .set_remove_from_version_id(remove_from_version.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_error("UpdateSecretVersionStage", secret_id, e))?;

        Ok(())
    }

    async fn create_secret(
        &self,
        name: &str,
        payload: &str,
        description: Option<&str>,
    ) -> Result<SecretHandle> {
        debug!(name = %name, "Creating secret in AWS Secrets Manager");

        let response = self
            .client
            .create_secret()
            .name(name)
            .secret_string(payload)
            .set_description(description.map(str::to_string))
            .send()
            .await
            .map_err(|e| provider_error("CreateSecret", e))?;

        Ok(SecretHandle {
            arn: response.arn().map(str::to_string),
            name: response.name().map(str::to_string),
            version_id: response.version_id().map(str::to_string),
            deletion_date: None,
        })
    }

    async fn delete_secret(&self, secret_id: &str, force_immediate: bool) -> Result<SecretHandle> {
        debug!(secret_id = %secret_id, force_immediate, "Deleting secret from AWS Secrets Manager");

        let response = self
            .client
            .delete_secret()
            .secret_id(secret_id)
            .force_delete_without_recovery(force_immediate)
            .send()
            .await
            .map_err(|e| map_error("DeleteSecret", secret_id, e))?;

        Ok(SecretHandle {
            arn: response.arn().map(str::to_string),
            name: response.name().map(str::to_string),
            version_id: None,
            deletion_date: response.deletion_date().and_then(to_chrono),
        })
    }

    async fn rotate_secret(
        &self,
        secret_id: &str,
        rotation_function_arn: &str,
        schedule: &RotationSchedule,
    ) -> Result<SecretHandle> {
        debug!(secret_id = %secret_id, "Enabling rotation in AWS Secrets Manager");

        let rules = RotationRulesType::builder()
            .schedule_expression(&schedule.schedule_expression)
            .set_duration(schedule.duration.clone())
            .build();

        let response = self
            .client
            .rotate_secret()
            .secret_id(secret_id)
            .rotation_lambda_arn(rotation_function_arn)
            .rotation_rules(rules)
            .send()
            .await
            .map_err(|e| map_error("RotateSecret", secret_id, e))?;

        Ok(SecretHandle {
            arn: response.arn().map(str::to_string),
            name: response.name().map(str::to_string),
            version_id: response.version_id().map(str::to_string),
            deletion_date: None,
        })
    }
}
