//! Credential resolution for the storage account.
//!
//! An access key selects shared-key signing. Without one the ambient
//! identity is used: a service principal from the environment, otherwise the
//! managed identity of the host.

mod shared_key;
mod token;

pub use shared_key::{string_to_sign, SharedKeyCredential};
pub use token::{TokenCredential, TokenSource, STORAGE_SCOPE};

use crate::error::{RestoreError, StorageError};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    Request, Url,
};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum StorageCredential {
    SharedKey(SharedKeyCredential),
    Token(Arc<TokenCredential>),
}

impl StorageCredential {
    pub fn describe(&self) -> &'static str {
        match self {
            StorageCredential::SharedKey(_) => "access key",
            StorageCredential::Token(token) => token.source().describe(),
        }
    }

    /// Add the authorization header. All other headers must already be set.
    pub async fn authorize(&self, request: &mut Request) -> Result<(), StorageError> {
        match self {
            StorageCredential::SharedKey(key) => key.sign(request),
            StorageCredential::Token(token) => {
                let secret = token.token().await?;
                let value = HeaderValue::from_str(&format!("Bearer {secret}"))
                    .map_err(|err| StorageError::transport(format!("invalid token: {err}")))?;
                request.headers_mut().insert(AUTHORIZATION, value);
                Ok(())
            }
        }
    }
}

/// Account name from `https://<account>.<service>.<domain>`.
pub fn account_from_uri(storage_uri: &str) -> Result<String, RestoreError> {
    let url = Url::parse(storage_uri).map_err(|err| {
        RestoreError::Validation(format!("invalid storage uri {storage_uri}: {err}"))
    })?;
    url.host_str()
        .and_then(|host| host.split('.').next())
        .filter(|account| !account.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RestoreError::Validation(format!("no account name in {storage_uri}")))
}

/// Build the credential for a run. Without an access key `ambient` is used;
/// it fetches a token up front so a resolution failure surfaces before any
/// listing happens.
pub async fn resolve(
    storage_uri: &str,
    access_key: Option<&str>,
    ambient: TokenSource,
    http: reqwest::Client,
) -> Result<StorageCredential, RestoreError> {
    match access_key {
        Some(key) => {
            let account = account_from_uri(storage_uri)?;
            Ok(StorageCredential::SharedKey(SharedKeyCredential::new(
                account, key,
            )?))
        }
        None => {
            let credential = TokenCredential::new(http, ambient);
            credential
                .token()
                .await
                .map_err(|err| RestoreError::Authentication(err.to_string()))?;
            Ok(StorageCredential::Token(Arc::new(credential)))
        }
    }
}
