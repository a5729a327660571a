use base64::{engine::general_purpose, Engine as _};
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

#[allow(clippy::unwrap_used)]
mod patterns {
    use lazy_static::lazy_static;
    use regex::Regex;

    lazy_static! {
        pub static ref ASTRA_TOKEN_REGEX: Regex = Regex::new(r"AstraCS:[A-Za-z0-9:_\-]+").unwrap();
        pub static ref BEARER_REGEX: Regex = Regex::new(r"(?i)\bbearer\s+([A-Za-z0-9._~+/=:\-]+)").unwrap();
        // Quotes may arrive escaped once when the event itself is rendered as JSON.
        pub static ref JSON_SECRET_REGEX: Regex = Regex::new(
            r#"(\\?)"(astraKey|clientSecret|secret|token)\\?"\s*:\s*\\?"((?:[^"\\]|\\[^"])*)\\?""#
        )
        .unwrap();
    }
}

use patterns::{ASTRA_TOKEN_REGEX, BEARER_REGEX, JSON_SECRET_REGEX};

const REDACTED: &str = "[REDACTED]";

/// Credential redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_astra_tokens: bool,
    pub redact_bearer_headers: bool,
    pub redact_json_secrets: bool,
    /// Replace values with a short hash instead of a fixed marker, so the same
    /// credential can be correlated across log lines.
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<(Regex, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_astra_tokens: true,
            redact_bearer_headers: true,
            redact_json_secrets: true,
            hash_for_correlation: false,
            custom_patterns: Vec::new(),
        }
    }
}

/// Masks Astra tokens, bearer headers and secret-bearing JSON fields.
#[derive(Debug, Clone, Default)]
pub struct TokenRedactor {
    config: RedactionConfig,
}

impl TokenRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        // JSON fields first: their values may themselves be Astra tokens.
        if self.config.redact_json_secrets {
            result = self.redact_json_secrets(&result);
        }

        if self.config.redact_bearer_headers {
            result = self.redact_bearer_headers(&result);
        }

        if self.config.redact_astra_tokens {
            result = self.redact_astra_tokens(&result);
        }

        for (pattern, replacement) in &self.config.custom_patterns {
            result = pattern.replace_all(&result, replacement.as_str()).into_owned();
        }

        result
    }

    fn redact_json_secrets(&self, text: &str) -> String {
        JSON_SECRET_REGEX
            .replace_all(text, |caps: &Captures| {
                let quote = format!("{}\"", group(caps, 1));
                format!(
                    "{q}{key}{q}:{q}{value}{q}",
                    q = quote,
                    key = group(caps, 2),
                    value = self.mask(group(caps, 3))
                )
            })
            .to_string()
    }

    fn redact_bearer_headers(&self, text: &str) -> String {
        BEARER_REGEX
            .replace_all(text, |caps: &Captures| format!("Bearer {}", self.mask(group(caps, 1))))
            .to_string()
    }

    fn redact_astra_tokens(&self, text: &str) -> String {
        ASTRA_TOKEN_REGEX
            .replace_all(text, |caps: &Captures| {
                if self.config.hash_for_correlation {
                    format!("AstraCS:{}", self.mask(group(caps, 0)))
                } else {
                    format!("AstraCS:{}", REDACTED)
                }
            })
            .to_string()
    }

    fn mask(&self, value: &str) -> String {
        if self.config.hash_for_correlation {
            format!("[{}]", hash_value(value))
        } else {
            REDACTED.to_string()
        }
    }
}

fn group<'t>(caps: &Captures<'t>, index: usize) -> &'t str {
    caps.get(index).map_or("", |m| m.as_str())
}

fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    general_purpose::STANDARD.encode(digest.get(..8).unwrap_or_default())
}
