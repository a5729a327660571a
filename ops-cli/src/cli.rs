use astra_rotation::store::RotationSchedule;
use astra_rotation::{RotationStep, VersionStage};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Astra token rotation operator tool
#[derive(Parser, Debug)]
#[command(name = "astra-rotate")]
#[command(about = "Manage Astra token secrets and run rotation steps locally")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "ASTRA_ROTATION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run rotation steps exactly as the secret store's scheduler would
    Invoke(InvokeArgs),
    /// Mint a token for the given roles and store it as a new secret
    Create(CreateArgs),
    /// Read and validate a stored credential document
    Get(GetArgs),
    /// Revoke a secret's token and delete the secret
    Delete(DeleteArgs),
    /// Enable scheduled rotation for a secret
    Rotate(RotateArgs),
}

#[derive(Args, Debug)]
pub struct InvokeArgs {
    /// Secret name or ARN
    #[arg(long, required_unless_present = "event", conflicts_with = "event")]
    pub secret_id: Option<String>,

    /// Version being rotated (the scheduler's ClientRequestToken)
    #[arg(long, required_unless_present = "event", conflicts_with = "event")]
    pub token: Option<String>,

    #[arg(long, value_enum, required_unless_present = "event", conflicts_with = "event")]
    pub step: Option<StepSelection>,

    /// JSON file holding a {SecretId, ClientRequestToken, Step} event
    #[arg(long)]
    pub event: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepSelection {
    #[value(name = "createSecret")]
    CreateSecret,
    #[value(name = "setSecret")]
    SetSecret,
    #[value(name = "testSecret")]
    TestSecret,
    #[value(name = "finishSecret")]
    FinishSecret,
    /// All four steps in order, stopping at the first failure
    #[value(name = "all")]
    All,
}

impl StepSelection {
    pub fn steps(self) -> Vec<RotationStep> {
        match self {
            StepSelection::CreateSecret => vec![RotationStep::CreateSecret],
            StepSelection::SetSecret => vec![RotationStep::SetSecret],
            StepSelection::TestSecret => vec![RotationStep::TestSecret],
            StepSelection::FinishSecret => vec![RotationStep::FinishSecret],
            StepSelection::All => RotationStep::ALL.to_vec(),
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Name of the new secret, e.g. /astra/prod/app1
    #[arg(long)]
    pub name: String,

    /// Astra role id granted to the new token (repeatable)
    #[arg(long = "role", required = true)]
    pub roles: Vec<String>,

    /// ARN of the root secret used to mint and later revoke the token
    #[arg(long)]
    pub root_arn: String,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[arg(long)]
    pub secret_id: String,

    #[arg(long, default_value = "AWSCURRENT")]
    pub stage: VersionStage,

    /// Print astraKey and clientSecret in clear text
    #[arg(long)]
    pub show_secrets: bool,

    /// Validate as a root document (no rootarn)
    #[arg(long)]
    pub root: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[arg(long)]
    pub secret_id: String,

    /// Delete without a recovery window
    #[arg(long)]
    pub force: bool,

    /// Leave the secret's client token active
    #[arg(long)]
    pub keep_token: bool,
}

#[derive(Args, Debug)]
pub struct RotateArgs {
    #[arg(long)]
    pub secret_id: String,

    /// ARN of the function that performs the rotation steps
    #[arg(long)]
    pub rotation_arn: String,

    #[arg(long, default_value = "cron(0 16 1,15 * ? *)")]
    pub schedule: String,

    #[arg(long, default_value = "2h")]
    pub duration: String,
}

impl RotateArgs {
    pub fn schedule(&self) -> RotationSchedule {
        RotationSchedule {
            schedule_expression: self.schedule.clone(),
            duration: Some(self.duration.clone()).filter(|d| !d.is_empty()),
        }
    }
}
