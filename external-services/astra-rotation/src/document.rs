//! Credential document stored as the secret payload
//!
//! The payload is a JSON object:
//!
//! ```json
//! {
//!     "astraKey": "AstraCS:...",
//!     "clientID": "...",
//!     "clientSecret": "...",
//!     "engine": "Astra",
//!     "rootarn": "arn:aws:secretsmanager:...:secret:/astra/prod/rootkey"
//! }
//! ```
//!
//! `rootarn` is required for derived credentials and absent on the root
//! credential itself. Documents are only constructed after validation.

use crate::{Result, RotationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Engine tag every document handled by this crate must carry.
pub const ENGINE_ASTRA: &str = "Astra";

const ASTRA_KEY: &str = "astraKey";
const CLIENT_ID: &str = "clientID";
const CLIENT_SECRET: &str = "clientSecret";
const ENGINE: &str = "engine";
const ROOT_ARN: &str = "rootarn";

const REDACTED: &str = "[REDACTED]";

/// Whether a document is a derived credential or the root credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Derived,
    Root,
}

impl DocumentKind {
    fn required_fields(self) -> &'static [&'static str] {
        match self {
            DocumentKind::Derived => &[ASTRA_KEY, CLIENT_ID, CLIENT_SECRET, ENGINE, ROOT_ARN],
            DocumentKind::Root => &[ASTRA_KEY, CLIENT_ID, CLIENT_SECRET, ENGINE],
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDocument {
    #[serde(rename = "astraKey")]
    pub astra_key: String,

    #[serde(rename = "clientID")]
    pub client_id: String,

    #[serde(rename = "clientSecret")]
    pub client_secret: String,

    pub engine: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootarn: Option<String>,

    /// Any additional keys, carried over unchanged on rotation.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CredentialDocument {
    /// Parse and validate a secret payload.
    pub fn parse(payload: &str, kind: DocumentKind) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| RotationError::MalformedSecret(format!("secret is not valid JSON: {}", e)))?;
        Self::from_value(value, kind)
    }

    pub fn from_value(value: Value, kind: DocumentKind) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            RotationError::MalformedSecret("secret JSON must be an object".to_string())
        })?;

        for field in kind.required_fields() {
            match object.get(*field) {
                Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(RotationError::MalformedSecret(format!(
                        "{} key must be a string in secret JSON",
                        field
                    )))
                }
                None => {
                    return Err(RotationError::MalformedSecret(format!(
                        "{} key is missing from secret JSON",
                        field
                    )))
                }
            }
        }

        if object.get(ENGINE).and_then(Value::as_str) != Some(ENGINE_ASTRA) {
            return Err(RotationError::MalformedSecret(format!(
                "engine must be set to '{}' in order to use this rotation handler",
                ENGINE_ASTRA
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| RotationError::MalformedSecret(format!("invalid secret JSON: {}", e)))
    }

    /// A fresh derived document pointing at `root_arn`.
    pub fn new_derived(
        astra_key: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        root_arn: impl Into<String>,
    ) -> Self {
        Self {
            astra_key: astra_key.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            engine: ENGINE_ASTRA.to_string(),
            rootarn: Some(root_arn.into()),
            extra: Map::new(),
        }
    }

    /// Clone of this document carrying a newly issued client token.
    pub fn with_client_token(&self, token: &crate::astra::ClientToken) -> Self {
        Self {
            astra_key: token.token.clone(),
            client_id: token.client_id.clone(),
            client_secret: token.secret.clone(),
            ..self.clone()
        }
    }

    /// Reference to the root credential. Root documents have none.
    pub fn root_arn(&self) -> Result<&str> {
        self.rootarn.as_deref().ok_or_else(|| {
            RotationError::MalformedSecret(format!("{} key is missing from secret JSON", ROOT_ARN))
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RotationError::MalformedSecret(format!("failed to encode secret JSON: {}", e)))
    }

    /// JSON view with the key and client secret masked.
    pub fn to_masked_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            for field in [ASTRA_KEY, CLIENT_SECRET] {
                if object.contains_key(field) {
                    object.insert(field.to_string(), Value::String(REDACTED.to_string()));
                }
            }
        }
        value
    }
}

impl fmt::Debug for CredentialDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDocument")
            .field("astra_key", &REDACTED)
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("engine", &self.engine)
            .field("rootarn", &self.rootarn)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn derived_json() -> Value {
        json!({
            "astraKey": "AstraCS:abc",
            "clientID": "C1",
            "clientSecret": "s3cret",
            "engine": "Astra",
            "rootarn": "/astra/prod/rootkey"
        })
    }

    #[test]
    fn test_parse_derived() {
        let doc = CredentialDocument::parse(&derived_json().to_string(), DocumentKind::Derived).unwrap();
        assert_eq!(doc.client_id, "C1");
        assert_eq!(doc.root_arn().unwrap(), "/astra/prod/rootkey");
        assert!(doc.extra.is_empty());
    }

    #[test]
    fn test_missing_engine_is_malformed() {
        let mut value = derived_json();
        value.as_object_mut().unwrap().remove("engine");
        let err = CredentialDocument::from_value(value, DocumentKind::Derived).unwrap_err();
        assert!(matches!(err, RotationError::MalformedSecret(ref m) if m.contains("engine")));
    }

    #[test]
    fn test_wrong_engine_is_malformed() {
        let mut value = derived_json();
        value["engine"] = json!("Postgres");
        let err = CredentialDocument::from_value(value, DocumentKind::Derived).unwrap_err();
        assert!(matches!(err, RotationError::MalformedSecret(_)));
    }

    #[test]
    fn test_rootarn_required_only_for_derived() {
        let mut value = derived_json();
        value.as_object_mut().unwrap().remove("rootarn");

        let err = CredentialDocument::from_value(value.clone(), DocumentKind::Derived).unwrap_err();
        assert!(matches!(err, RotationError::MalformedSecret(ref m) if m.contains("rootarn")));

        let root = CredentialDocument::from_value(value, DocumentKind::Root).unwrap();
        assert!(root.rootarn.is_none());
        assert!(root.root_arn().is_err());
    }

    #[test]
    fn test_non_string_field_is_malformed() {
        let mut value = derived_json();
        value["clientID"] = json!(42);
        let err = CredentialDocument::from_value(value, DocumentKind::Derived).unwrap_err();
        assert!(matches!(err, RotationError::MalformedSecret(ref m) if m.contains("clientID")));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = CredentialDocument::parse("{not json", DocumentKind::Root).unwrap_err();
        assert!(matches!(err, RotationError::MalformedSecret(_)));

        let err = CredentialDocument::parse("[1, 2]", DocumentKind::Root).unwrap_err();
        assert!(matches!(err, RotationError::MalformedSecret(_)));
    }

    #[test]
    fn test_extra_fields_survive_token_swap() {
        let mut value = derived_json();
        value["keyspace"] = json!("app1");
        let doc = CredentialDocument::from_value(value, DocumentKind::Derived).unwrap();

        let rotated = doc.with_client_token(&crate::astra::ClientToken {
            client_id: "C2".to_string(),
            secret: "new-secret".to_string(),
            token: "AstraCS:new".to_string(),
        });

        assert_eq!(rotated.client_id, "C2");
        assert_eq!(rotated.astra_key, "AstraCS:new");
        assert_eq!(rotated.rootarn, doc.rootarn);
        assert_eq!(rotated.extra.get("keyspace"), Some(&json!("app1")));

        let encoded: Value = serde_json::from_str(&rotated.to_json().unwrap()).unwrap();
        assert_eq!(encoded["keyspace"], "app1");
        assert_eq!(encoded["clientID"], "C2");
    }

    #[test]
    fn test_debug_and_masked_view_hide_secrets() {
        let doc = CredentialDocument::from_value(derived_json(), DocumentKind::Derived).unwrap();
        let debug = format!("{:?}", doc);
        assert!(!debug.contains("AstraCS:abc"));
        assert!(!debug.contains("s3cret"));

        let masked = doc.to_masked_value();
        assert_eq!(masked["astraKey"], "[REDACTED]");
        assert_eq!(masked["clientSecret"], "[REDACTED]");
        assert_eq!(masked["clientID"], "C1");
    }
}
