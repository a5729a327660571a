//! Secret store provider implementations

pub mod aws;
pub mod memory;

pub use aws::AwsSecretsManagerStore;
pub use memory::InMemorySecretStore;
