//! Operator CLI for Astra token secrets
//!
//! Wraps the rotation handler for local runs and provides the secret
//! utilities operators need around it.
//!
//! # Example Usage
//!
//! ```bash
//! # Run a full rotation cycle for one version
//! astra-rotate invoke --secret-id /astra/prod/app1 --token 3f1c... --step all
//!
//! # Replay a scheduler event
//! astra-rotate invoke --event event.json
//!
//! # Secret lifecycle
//! astra-rotate create --name /astra/prod/app1 --role b08e981a-... --root-arn arn:aws:secretsmanager:...:secret:/astra/prod/rootkey
//! astra-rotate get --secret-id /astra/prod/app1 --stage AWSPENDING
//! astra-rotate rotate --secret-id /astra/prod/app1 --rotation-arn arn:aws:lambda:...:function:rotateAstraToken
//! astra-rotate delete --secret-id /astra/prod/app1 --force
//! ```

pub mod cli;
pub mod commands;

pub use cli::Cli;
pub use commands::{run, Services};
