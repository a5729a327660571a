use crate::cli::{Cli, Command, CreateArgs, DeleteArgs, GetArgs, InvokeArgs, RotateArgs};
use anyhow::{bail, Context};
use astra_rotation::audit::AuditLogger;
use astra_rotation::config::layered_settings;
use astra_rotation::http::AstraHttpClient;
use astra_rotation::store::{self, SecretHandle, SecretStore};
use astra_rotation::{
    AstraTokenAuthority, AwsSecretsManagerStore, CredentialDocument, DocumentKind, RotationConfig,
    RotationEvent, RotationHandler, Rotator, StepOutcome, TokenAuthority, VersionStage,
};
use logger_redacted::{init_tracing, LoggerConfig};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Store, token authority and audit sink shared by all commands.
pub struct Services {
    pub store: Arc<dyn SecretStore>,
    pub authority: Arc<dyn TokenAuthority>,
    pub audit: AuditLogger,
}

impl Services {
    pub async fn from_config(config: &RotationConfig) -> anyhow::Result<Self> {
        let store = AwsSecretsManagerStore::new(&config.secrets_manager)
            .await
            .context("Failed to configure AWS Secrets Manager client")?;
        let http = AstraHttpClient::new(&config.astra).context("Failed to configure Astra client")?;

        Ok(Self {
            store: Arc::new(store),
            authority: Arc::new(AstraTokenAuthority::new(http)),
            audit: AuditLogger::new(config.audit.enabled),
        })
    }

    pub fn handler(&self) -> RotationHandler {
        let rotator = Rotator::new(self.store.clone(), self.authority.clone()).with_audit(self.audit.clone());
        RotationHandler::new(rotator)
    }
}

/// Result of one step run by `invoke`.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub outcome: String,
}

impl StepReport {
    fn new(step: &str, outcome: StepOutcome) -> Self {
        Self {
            step: step.to_string(),
            outcome: format!("{:?}", outcome),
        }
    }
}

/// Parse CLI arguments' configuration, initialize logging and run the command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = layered_settings(cli.config.as_deref()).context("Failed to load configuration")?;

    let mut logging = logging_config(&settings)?;
    if cli.verbose {
        logging = logging.with_log_level("debug");
    }
    if cli.json_logs {
        logging = logging.with_json(true);
    }
    if let Err(e) = init_tracing(&logging) {
        eprintln!("warning: {}", e);
    }

    let config = RotationConfig::from_settings(&settings).context("Invalid configuration")?;
    let services = Services::from_config(&config).await?;

    let output = match &cli.command {
        Command::Invoke(args) => {
            let events = invoke_events(args)?;
            serde_json::to_value(invoke(&services.handler(), &events).await?)?
        }
        Command::Create(args) => serde_json::to_value(create(&services, args).await?)?,
        Command::Get(args) => get(services.store.as_ref(), args).await?,
        Command::Delete(args) => serde_json::to_value(delete(&services, args).await?)?,
        Command::Rotate(args) => serde_json::to_value(rotate(services.store.as_ref(), args).await?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// The `logging` section of `settings`; defaults apply when it is absent.
pub fn logging_config(settings: &::config::Config) -> anyhow::Result<LoggerConfig> {
    match settings.get::<LoggerConfig>("logging") {
        Ok(logging) => Ok(logging),
        Err(::config::ConfigError::NotFound(_)) => Ok(LoggerConfig::default()),
        Err(e) => Err(e).context("Invalid logging configuration"),
    }
}

/// Events for `invoke`, from `--event` or from the individual flags.
pub fn invoke_events(args: &InvokeArgs) -> anyhow::Result<Vec<RotationEvent>> {
    if let Some(path) = &args.event {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?;
        let event: RotationEvent = serde_json::from_str(&raw)
            .with_context(|| format!("Event file {} is not a rotation event", path.display()))?;
        return Ok(vec![event]);
    }

    let (Some(secret_id), Some(token), Some(selection)) = (&args.secret_id, &args.token, args.step) else {
        bail!("--secret-id, --token and --step are required without --event");
    };

    Ok(selection
        .steps()
        .into_iter()
        .map(|step| RotationEvent::new(secret_id, token, step))
        .collect())
}

/// Run `events` in order through the entry point, stopping at the first failure.
pub async fn invoke(handler: &RotationHandler, events: &[RotationEvent]) -> anyhow::Result<Vec<StepReport>> {
    let mut reports = Vec::with_capacity(events.len());

    for event in events {
        let outcome = handler
            .handle(event)
            .await
            .with_context(|| format!("{} failed for {}", event.step, event.secret_id))?;
        info!(secret_id = %event.secret_id, step = %event.step, outcome = ?outcome, "Step finished");
        reports.push(StepReport::new(&event.step, outcome));
    }

    Ok(reports)
}

/// Mint a token with `args.roles` using the root key and store it as a new secret.
pub async fn create(services: &Services, args: &CreateArgs) -> anyhow::Result<SecretHandle> {
    let root = store::read_secret(
        services.store.as_ref(),
        &args.root_arn,
        VersionStage::Current,
        None,
        DocumentKind::Root,
    )
    .await
    .with_context(|| format!("Failed to read root secret {}", args.root_arn))?;

    let issued = services
        .authority
        .create_token(&root.astra_key, &args.roles)
        .await
        .context("Unable to create token")?;
    info!(client_id = %issued.client_id, "Successfully created token");

    let document = CredentialDocument::new_derived(
        issued.token.as_str(),
        issued.client_id.as_str(),
        issued.secret.as_str(),
        args.root_arn.as_str(),
    );

    let handle = services
        .store
        .create_secret(&args.name, &document.to_json()?, args.description.as_deref())
        .await
        .with_context(|| format!("Failed to create secret {}", args.name))?;
    info!(name = %args.name, client_id = %document.client_id, "Created secret");

    Ok(handle)
}

/// Read and validate a document, masking secret fields unless asked not to.
pub async fn get(store: &dyn SecretStore, args: &GetArgs) -> anyhow::Result<Value> {
    let kind = if args.root { DocumentKind::Root } else { DocumentKind::Derived };
    let document = store::read_secret(store, &args.secret_id, args.stage, None, kind)
        .await
        .with_context(|| format!("Failed to read {} at {}", args.secret_id, args.stage))?;

    if args.show_secrets {
        Ok(serde_json::to_value(&document)?)
    } else {
        Ok(document.to_masked_value())
    }
}

/// Revoke the secret's client token, then delete the secret.
pub async fn delete(services: &Services, args: &DeleteArgs) -> anyhow::Result<SecretHandle> {
    if args.keep_token {
        warn!(secret_id = %args.secret_id, "Deleting secret without revoking its token");
    } else {
        let current = store::read_secret(
            services.store.as_ref(),
            &args.secret_id,
            VersionStage::Current,
            None,
            DocumentKind::Derived,
        )
        .await?;
        let root_arn = current.root_arn()?;
        let root = store::read_secret(
            services.store.as_ref(),
            root_arn,
            VersionStage::Current,
            None,
            DocumentKind::Root,
        )
        .await
        .with_context(|| format!("Failed to read root secret {}", root_arn))?;

        let status = services.authority.delete_token(&root.astra_key, &current.client_id).await?;
        if status != 200 && status != 204 {
            bail!(
                "Failed to delete token {}: received status {}; secret {} was not deleted",
                current.client_id,
                status,
                args.secret_id
            );
        }
        info!(client_id = %current.client_id, "Deleted token");
    }

    let handle = services
        .store
        .delete_secret(&args.secret_id, args.force)
        .await
        .with_context(|| format!("Failed to delete secret {}", args.secret_id))?;
    info!(secret_id = %args.secret_id, force = args.force, "Deleted secret");

    Ok(handle)
}

pub async fn rotate(store: &dyn SecretStore, args: &RotateArgs) -> anyhow::Result<SecretHandle> {
    let handle = store
        .rotate_secret(&args.secret_id, &args.rotation_arn, &args.schedule())
        .await
        .with_context(|| format!("Failed to enable rotation for {}", args.secret_id))?;
    info!(secret_id = %args.secret_id, schedule = %args.schedule, "Enabled rotation");
    Ok(handle)
}
