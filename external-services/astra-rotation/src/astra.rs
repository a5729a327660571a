//! Astra token authority: client listing, token issue and revocation

use crate::http::{ApiResponse, AstraHttpClient};
use crate::{Result, RotationError};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

pub const CLIENT_ID_SECRETS_PATH: &str = "/v2/clientIdSecrets";
pub const CURRENT_ORG_PATH: &str = "/v2/currentOrg";

/// Newly issued client credentials.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientToken {
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub secret: String,
    pub token: String,
}

impl std::fmt::Debug for ClientToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientToken")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ClientListing {
    clients: Vec<ClientEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientEntry {
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(default)]
    roles: Vec<String>,
}

/// Operations the rotation steps need from the token authority.
#[async_trait]
pub trait TokenAuthority: Send + Sync {
    /// Roles granted to `client_id`. `NotFound` if the authority does not know it.
    async fn list_roles(&self, root_key: &str, client_id: &str) -> Result<Vec<String>>;

    /// Issue a new client token carrying `roles`.
    async fn create_token(&self, root_key: &str, roles: &[String]) -> Result<ClientToken>;

    /// Revoke `client_id`, returning the authority's status code.
    async fn delete_token(&self, root_key: &str, client_id: &str) -> Result<u16>;

    /// Liveness probe authenticated with `token`.
    async fn current_org(&self, token: &str) -> Result<ApiResponse>;
}

pub struct AstraTokenAuthority {
    http: AstraHttpClient,
}

impl AstraTokenAuthority {
    pub fn new(http: AstraHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TokenAuthority for AstraTokenAuthority {
    async fn list_roles(&self, root_key: &str, client_id: &str) -> Result<Vec<String>> {
        let response = self
            .http
            .request(root_key, Method::GET, CLIENT_ID_SECRETS_PATH, None)
            .await?;

        if !response.status.is_success() {
            return Err(RotationError::UnexpectedResponse {
                status: response.status_code(),
                body: response.body_text(),
            });
        }

        let status = response.status_code();
        let listing: ClientListing = response
            .body
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| RotationError::UnexpectedResponse {
                status,
                body: format!("client listing could not be decoded: {}", e),
            })?
            .unwrap_or(ClientListing { clients: Vec::new() });

        debug!(clients = listing.clients.len(), "Fetched client listing");

        listing
            .clients
            .into_iter()
            .find(|client| client.client_id == client_id)
            .map(|client| client.roles)
            .ok_or_else(|| {
                RotationError::NotFound(format!("client {} not found in token authority", client_id))
            })
    }

    async fn create_token(&self, root_key: &str, roles: &[String]) -> Result<ClientToken> {
        let payload = json!({ "roles": roles });
        let response = self
            .http
            .request(root_key, Method::POST, CLIENT_ID_SECRETS_PATH, Some(&payload))
            .await
            .map_err(|e| RotationError::TokenCreation(e.to_string()))?;

        if !response.status.is_success() {
            return Err(RotationError::TokenCreation(format!(
                "token authority returned status {}: {}",
                response.status_code(),
                response.body_text()
            )));
        }

        let token: ClientToken = response
            .body
            .ok_or_else(|| RotationError::TokenCreation("token authority returned an empty body".to_string()))
            .and_then(|body| {
                serde_json::from_value(body)
                    .map_err(|e| RotationError::TokenCreation(format!("malformed token response: {}", e)))
            })?;

        info!(client_id = %token.client_id, "Created client token");
        Ok(token)
    }

    async fn delete_token(&self, root_key: &str, client_id: &str) -> Result<u16> {
        let path = format!("{}/{}", CLIENT_ID_SECRETS_PATH, client_id);
        let response = self.http.request(root_key, Method::DELETE, &path, None).await?;
        debug!(client_id = %client_id, status = response.status_code(), "Delete token responded");
        Ok(response.status_code())
    }

    async fn current_org(&self, token: &str) -> Result<ApiResponse> {
        self.http.request(token, Method::GET, CURRENT_ORG_PATH, None).await
    }
}
