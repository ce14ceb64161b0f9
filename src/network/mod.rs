use crate::{
    credential::StorageCredential,
    error::{RestoreError, StorageError},
    models::DeletedPath,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

pub const API_VERSION: &str = "2021-06-08";
const LIST_PAGE_SIZE: &str = "5000";

/// Restores one deleted path.
#[async_trait]
pub trait RestoreTarget: Send + Sync {
    async fn undelete(&self, path: &str, deletion_id: &str) -> Result<(), StorageError>;
}

/// Enumerates the deleted paths of a container, once.
pub trait DeletedPathSource: Send + Sync {
    fn deleted_paths(&self) -> BoxStream<'_, Result<DeletedPath, StorageError>>;
}

#[derive(Clone, Debug)]
pub struct StorageClient {
    http: reqwest::Client,
    container_url: Url,
    credential: StorageCredential,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: BlobList,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobEntry {
    name: String,
    #[serde(default)]
    deletion_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

struct ListPage {
    items: Vec<DeletedPath>,
    next_marker: Option<String>,
}

impl StorageClient {
    /// Client for `container` under a `blob` or `dfs` account URI. Both
    /// listing and undelete go to the blob endpoint.
    pub fn new(
        http: reqwest::Client,
        storage_uri: &str,
        container: &str,
        credential: StorageCredential,
    ) -> Result<Self, RestoreError> {
        let mut endpoint = Url::parse(storage_uri)
            .map_err(|err| RestoreError::Validation(format!("invalid storage uri: {err}")))?;
        if let Some(host) = endpoint.host_str() {
            let blob_host = host.replacen(".dfs.", ".blob.", 1);
            endpoint
                .set_host(Some(&blob_host))
                .map_err(|err| RestoreError::Validation(format!("invalid storage host: {err}")))?;
        }
        Self::with_endpoint(http, endpoint, container, credential)
    }

    pub fn with_endpoint(
        http: reqwest::Client,
        endpoint: Url,
        container: &str,
        credential: StorageCredential,
    ) -> Result<Self, RestoreError> {
        let mut container_url = endpoint;
        container_url
            .path_segments_mut()
            .map_err(|_| RestoreError::Validation("storage uri cannot hold a path".into()))?
            .pop_if_empty()
            .push(container);
        container_url.set_query(None);
        Ok(Self {
            http,
            container_url,
            credential,
        })
    }

    pub fn container_url(&self) -> &Url {
        &self.container_url
    }

    fn path_url(&self, path: &str) -> Result<Url, StorageError> {
        let mut url = self.container_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::transport("container url cannot hold a path"))?
            .extend(path.trim_matches('/').split('/'));
        Ok(url)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StorageError> {
        let mut request = builder
            .header("x-ms-version", API_VERSION)
            .header(
                "x-ms-date",
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            )
            .header("x-ms-client-request-id", Uuid::new_v4().to_string())
            .build()?;
        self.credential.authorize(&mut request).await?;

        let resp = self.http.execute(request).await?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(error_from_response(resp).await)
        }
    }

    async fn list_page(&self, marker: Option<&str>) -> Result<ListPage, StorageError> {
        let mut query = vec![
            ("restype", "container"),
            ("comp", "list"),
            ("showonly", "deleted"),
            ("maxresults", LIST_PAGE_SIZE),
        ];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }
        let resp = self
            .send(self.http.get(self.container_url.clone()).query(&query))
            .await?;
        let body = resp.text().await?;
        let parsed: EnumerationResults = quick_xml::de::from_str(&body)
            .map_err(|err| StorageError::transport(format!("malformed listing response: {err}")))?;

        let mut items = Vec::with_capacity(parsed.blobs.items.len());
        for entry in parsed.blobs.items {
            match entry.deletion_id.filter(|id| !id.is_empty()) {
                Some(deletion_id) => items.push(DeletedPath {
                    name: entry.name,
                    deletion_id,
                }),
                None => warn!(path = %entry.name, "deleted path has no deletion id; skipping"),
            }
        }
        debug!(count = items.len(), "listed page of deleted paths");

        Ok(ListPage {
            items,
            next_marker: parsed.next_marker.filter(|m| !m.is_empty()),
        })
    }
}

impl DeletedPathSource for StorageClient {
    fn deleted_paths(&self) -> BoxStream<'_, Result<DeletedPath, StorageError>> {
        // State is the marker of the next page; `None` once the last page is in.
        stream::try_unfold(Some(None::<String>), move |marker| async move {
            let Some(marker) = marker else {
                return Ok(None);
            };
            let page = self.list_page(marker.as_deref()).await?;
            let next = page.next_marker.map(Some);
            let items = stream::iter(page.items.into_iter().map(Ok::<_, StorageError>));
            Ok::<_, StorageError>(Some((items, next)))
        })
        .try_flatten()
        .boxed()
    }
}

#[async_trait]
impl RestoreTarget for StorageClient {
    async fn undelete(&self, path: &str, deletion_id: &str) -> Result<(), StorageError> {
        let url = self.path_url(path)?;
        let encoded_path = url
            .path()
            .strip_prefix(self.container_url.path())
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();
        let source = format!("{encoded_path}?deletionid={deletion_id}");

        self.send(
            self.http
                .request(Method::PUT, url)
                .query(&[("comp", "undelete")])
                .header("x-ms-undelete-source", source)
                .header("content-length", "0"),
        )
        .await?;
        Ok(())
    }
}

async fn error_from_response(resp: Response) -> StorageError {
    let status = resp.status();
    let header_code = resp
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await.unwrap_or_default();
    let parsed: ErrorBody = quick_xml::de::from_str(&body).unwrap_or_default();

    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    let detail = parsed
        .message
        .map(|m| m.lines().next().unwrap_or_default().trim().to_string())
        .filter(|m| !m.is_empty());
    let message = match detail {
        Some(detail) => format!("{} {reason}: {detail}", status.as_u16()),
        None => format!("{} {reason}", status.as_u16()),
    };

    StorageError {
        status: Some(status.as_u16()),
        code: header_code.or(parsed.code),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::SharedKeyCredential;

    fn credential() -> StorageCredential {
        StorageCredential::SharedKey(
            SharedKeyCredential::new("acct", "c2VjcmV0LWtleQ==").expect("key"),
        )
    }

    #[test]
    fn dfs_uri_maps_to_blob_endpoint() {
        let client = StorageClient::new(
            reqwest::Client::new(),
            "https://acct.dfs.core.windows.net",
            "data",
            credential(),
        )
        .expect("client");
        assert_eq!(
            client.container_url().as_str(),
            "https://acct.blob.core.windows.net/data"
        );
    }

    #[test]
    fn path_url_encodes_segments() {
        let client = StorageClient::new(
            reqwest::Client::new(),
            "https://acct.blob.core.windows.net",
            "data",
            credential(),
        )
        .expect("client");
        let url = client.path_url("/dir/a b.txt").expect("url");
        assert_eq!(url.path(), "/data/dir/a%20b.txt");
    }

    #[test]
    fn listing_xml_parses_entries_and_marker() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="data">
  <Blobs>
    <Blob><Name>dir</Name><Deleted>true</Deleted><DeletionId>1</DeletionId></Blob>
    <Blob><Name>dir/file.txt</Name><Deleted>true</Deleted><DeletionId>2</DeletionId></Blob>
  </Blobs>
  <NextMarker>page2</NextMarker>
</EnumerationResults>"#;
        let parsed: EnumerationResults = quick_xml::de::from_str(body).expect("xml");
        assert_eq!(parsed.blobs.items.len(), 2);
        assert_eq!(parsed.blobs.items[1].name, "dir/file.txt");
        assert_eq!(parsed.blobs.items[1].deletion_id.as_deref(), Some("2"));
        assert_eq!(parsed.next_marker.as_deref(), Some("page2"));
    }
}
