//! The `TokenValidator` capability.
//!
//! JWT validation against a remote key set is explicitly out of the core's
//! scope — it's modeled here only as a pluggable interface. Two
//! implementations are provided: a permissive development validator
//! (`SKIP_AUTH`) and a default validator that checks the bearer credential
//! against an Auth0 tenant's `/userinfo` endpoint. Neither does local JWKS
//! verification; a production deployment may swap in a stricter validator
//! without the core needing to change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An authenticated, connected participant's identity. Immutable for the
/// lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub client_id: String,
    pub display_name: String,
}

pub const MAX_DISPLAY_NAME_LEN: usize = 128;

#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<ClientInfo, CoreError>;
}

/// Accepts any non-empty bearer token, selected by `SKIP_AUTH=true`.
///
/// The token itself becomes the client id (so repeated connections with the
/// same token are recognizable as the same participant in local testing); an
/// empty token is rejected, since an empty credential isn't a credential.
pub struct DevValidator;

#[async_trait]
impl TokenValidator for DevValidator {
    async fn validate(&self, token: &str) -> Result<ClientInfo, CoreError> {
        if token.is_empty() {
            return Err(CoreError::Auth("empty development token".into()));
        }
        let client_id = token.to_string();
        let display_name = truncate_display_name(&format!("Guest-{}", &client_id[..client_id.len().min(6)]));
        Ok(ClientInfo {
            client_id,
            display_name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
}

/// Default production validator: presents the bearer token to the tenant's
/// `/userinfo` endpoint and trusts Auth0 to have already verified it.
pub struct Auth0Validator {
    userinfo_url: String,
    http: reqwest::Client,
}

impl Auth0Validator {
    pub fn new(domain: &str) -> Self {
        let domain = domain.trim_end_matches('/');
        let userinfo_url = if domain.starts_with("http") {
            format!("{domain}/userinfo")
        } else {
            format!("https://{domain}/userinfo")
        };
        Auth0Validator {
            userinfo_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TokenValidator for Auth0Validator {
    async fn validate(&self, token: &str) -> Result<ClientInfo, CoreError> {
        if token.is_empty() {
            return Err(CoreError::Auth("empty bearer token".into()));
        }

        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CoreError::Auth(format!("userinfo request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Auth(format!(
                "userinfo rejected token: {}",
                response.status()
            )));
        }

        let body: UserInfoResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Auth(format!("malformed userinfo response: {e}")))?;

        let display_name = body
            .name
            .or(body.nickname)
            .unwrap_or_else(|| body.sub.clone());

        Ok(ClientInfo {
            client_id: body.sub,
            display_name: truncate_display_name(&display_name),
        })
    }
}

fn truncate_display_name(name: &str) -> String {
    if name.chars().count() <= MAX_DISPLAY_NAME_LEN {
        name.to_string()
    } else {
        name.chars().take(MAX_DISPLAY_NAME_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dev_validator_rejects_empty_token() {
        let result = DevValidator.validate("").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dev_validator_accepts_any_nonempty_token() {
        let info = DevValidator.validate("abc123").await.unwrap();
        assert_eq!(info.client_id, "abc123");
        assert!(info.display_name.starts_with("Guest-"));
    }

    #[test]
    fn truncate_display_name_caps_at_128_chars() {
        let long = "a".repeat(200);
        let truncated = truncate_display_name(&long);
        assert_eq!(truncated.chars().count(), MAX_DISPLAY_NAME_LEN);
    }
}
