//! Bearer tokens from the ambient identity.

use crate::error::StorageError;
use serde::Deserialize;
use std::time::Duration;
use tokio::{sync::RwLock, time::Instant};
use tracing::debug;

pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
const STORAGE_RESOURCE: &str = "https://storage.azure.com/";
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    ClientSecret {
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    ManagedIdentity {
        endpoint: String,
        client_id: Option<String>,
    },
}

impl TokenSource {
    /// Client secret when all three variables are set, managed identity otherwise.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        match (
            non_empty("AZURE_TENANT_ID"),
            non_empty("AZURE_CLIENT_ID"),
            non_empty("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => TokenSource::ClientSecret {
                authority: non_empty("AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string()),
                tenant_id,
                client_id,
                client_secret,
            },
            (_, client_id, _) => TokenSource::ManagedIdentity {
                endpoint: IMDS_ENDPOINT.to_string(),
                client_id,
            },
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TokenSource::ClientSecret { .. } => "client secret",
            TokenSource::ManagedIdentity { .. } => "managed identity",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Seconds,
}

/// The token endpoint sends a number, the metadata endpoint a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(u64),
    Text(String),
}

impl Seconds {
    fn as_duration(&self) -> Result<Duration, StorageError> {
        match self {
            Seconds::Number(n) => Ok(Duration::from_secs(*n)),
            Seconds::Text(s) => s
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| StorageError::transport(format!("invalid expires_in: {s:?}"))),
        }
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    secret: String,
    expires_at: Instant,
}

pub struct TokenCredential {
    http: reqwest::Client,
    source: TokenSource,
    cached: RwLock<Option<AccessToken>>,
}

impl std::fmt::Debug for TokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredential")
            .field("source", &self.source.describe())
            .finish_non_exhaustive()
    }
}

impl TokenCredential {
    pub fn new(http: reqwest::Client, source: TokenSource) -> Self {
        Self {
            http,
            source,
            cached: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &TokenSource {
        &self.source
    }

    pub async fn token(&self) -> Result<String, StorageError> {
        if let Some(token) = self.fresh(&*self.cached.read().await) {
            return Ok(token);
        }

        let mut guard = self.cached.write().await;
        if let Some(token) = self.fresh(&guard) {
            return Ok(token);
        }
        let token = self.fetch().await?;
        let secret = token.secret.clone();
        *guard = Some(token);
        Ok(secret)
    }

    fn fresh(&self, cached: &Option<AccessToken>) -> Option<String> {
        cached
            .as_ref()
            .filter(|t| t.expires_at.saturating_duration_since(Instant::now()) > REFRESH_MARGIN)
            .map(|t| t.secret.clone())
    }

    async fn fetch(&self) -> Result<AccessToken, StorageError> {
        let requested_at = Instant::now();
        let request = match &self.source {
            TokenSource::ClientSecret {
                authority,
                tenant_id,
                client_id,
                client_secret,
            } => self
                .http
                .post(format!(
                    "{}/{tenant_id}/oauth2/v2.0/token",
                    authority.trim_end_matches('/')
                ))
                .form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", STORAGE_SCOPE),
                ]),
            TokenSource::ManagedIdentity {
                endpoint,
                client_id,
            } => {
                let mut query = vec![
                    ("api-version", "2018-02-01"),
                    ("resource", STORAGE_RESOURCE),
                ];
                if let Some(id) = client_id {
                    query.push(("client_id", id.as_str()));
                }
                self.http
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query)
            }
        };

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::new(
                Some(status.as_u16()),
                None,
                format!("token request failed with {status}: {}", body.trim()),
            ));
        }

        let parsed: TokenResponse = resp.json().await?;
        let lifetime = parsed.expires_in.as_duration()?;
        debug!(
            source = self.source.describe(),
            lifetime_secs = lifetime.as_secs(),
            "acquired access token"
        );
        Ok(AccessToken {
            secret: parsed.access_token,
            expires_at: requested_at + lifetime,
        })
    }
}
