//! # Astra Token Rotation
//!
//! Rotation handler for Astra client tokens kept in AWS Secrets Manager.
//!
//! ## Rotation steps:
//! - `createSecret`: issue a new client token with the current token's roles
//!   and stage it as `AWSPENDING`
//! - `setSecret`: no-op, tokens need no install phase
//! - `testSecret`: probe the token authority with the pending key
//! - `finishSecret`: revoke the old token, then promote the pending version
//!
//! ## Features:
//! - Idempotent steps, safe to re-invoke
//! - Fresh root-credential lookup on every step
//! - Layered configuration (file + environment)
//! - Audit logging
//! - In-memory store for local runs and tests

pub mod astra;
pub mod audit;
pub mod config;
pub mod document;
pub mod error;
pub mod handler;
pub mod http;
pub mod providers;
pub mod rotation;
pub mod store;

pub use crate::astra::{AstraTokenAuthority, ClientToken, TokenAuthority};
pub use crate::config::{AstraApiConfig, AuditConfig, AwsSecretsManagerConfig, RotationConfig};
pub use crate::document::{CredentialDocument, DocumentKind};
pub use crate::error::RotationError;
pub use crate::handler::{RotationEvent, RotationHandler};
pub use crate::providers::{AwsSecretsManagerStore, InMemorySecretStore};
pub use crate::rotation::{RotationStep, Rotator, StepOutcome};
pub use crate::store::{SecretStore, VersionStage};

/// Result type for the rotation handler
pub type Result<T> = std::result::Result<T, RotationError>;
