use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::ServiceError;

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const FOUNDRY_SCOPE: &str = "https://ai.azure.com/.default";

/// Tokens are refreshed this long before the issuer says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Service-principal credential using the OAuth2 client-credentials grant.
pub struct ClientSecretCredential {
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    scope: String,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientSecretCredential {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            tenant_id,
            client_id,
            client_secret,
            scope: FOUNDRY_SCOPE.to_string(),
            client: Client::new(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Bearer token for the Foundry scope, served from cache while still fresh.
    pub async fn token(&self) -> Result<String, ServiceError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn request_token(&self) -> Result<CachedToken, ServiceError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self.client.post(self.token_url()).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ServiceError::Auth(format!(
                "token request failed (HTTP {}): {}",
                status, body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::Auth(format!("failed to parse token response: {}", e)))?;

        if let Some(error) = token.error {
            let desc = token.error_description.unwrap_or_default();
            return Err(ServiceError::Auth(format!("{} - {}", error, desc)));
        }

        let value = token
            .access_token
            .ok_or_else(|| ServiceError::Auth("no access_token in response".to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        debug!("Acquired Foundry access token (expires in {:?})", lifetime);

        Ok(CachedToken {
            value,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_url_uses_tenant_and_trims_authority() {
        let credential = ClientSecretCredential::new(
            "tenant-1".to_string(),
            "client".to_string(),
            "secret".to_string(),
        )
        .with_authority("http://127.0.0.1:9000/");
        assert_eq!(
            credential.token_url(),
            "http://127.0.0.1:9000/tenant-1/oauth2/v2.0/token"
        );
    }

    #[test]
    fn default_authority_is_entra() {
        let credential =
            ClientSecretCredential::new("t".to_string(), "c".to_string(), "s".to_string());
        assert!(credential.token_url().starts_with(DEFAULT_AUTHORITY));
        assert_eq!(credential.scope, FOUNDRY_SCOPE);
    }
}
