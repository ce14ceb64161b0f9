use futures::TryStreamExt;
use mass_undelete::{
    credential::{SharedKeyCredential, StorageCredential},
    error::RestoreError,
    network::{DeletedPathSource, RestoreTarget, StorageClient, API_VERSION},
    restore::{ErrorClassifier, FailureKind},
    scheduler::collect_items,
};
use reqwest::Url;
use wiremock::{
    matchers::{header, header_exists, method, path, query_param, query_param_is_missing},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer) -> StorageClient {
    let credential = StorageCredential::SharedKey(
        SharedKeyCredential::new("acct", "c2VjcmV0LWtleQ==").expect("key"),
    );
    StorageClient::with_endpoint(
        reqwest::Client::new(),
        Url::parse(&server.uri()).expect("uri"),
        "data",
        credential,
    )
    .expect("client")
}

fn listing(entries: &[(&str, Option<&str>)], next_marker: Option<&str>) -> String {
    let blobs: String = entries
        .iter()
        .map(|(name, id)| match id {
            Some(id) => format!(
                "<Blob><Name>{name}</Name><Deleted>true</Deleted><DeletionId>{id}</DeletionId></Blob>"
            ),
            None => format!("<Blob><Name>{name}</Name><Deleted>true</Deleted></Blob>"),
        })
        .collect();
    let marker = match next_marker {
        Some(m) => format!("<NextMarker>{m}</NextMarker>"),
        None => "<NextMarker />".to_string(),
    };
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><EnumerationResults ServiceEndpoint="http://localhost/" ContainerName="data"><Blobs>{blobs}</Blobs>{marker}</EnumerationResults>"#
    )
}

#[tokio::test]
async fn listing_follows_continuation_markers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(query_param("restype", "container"))
        .and(query_param("comp", "list"))
        .and(query_param("showonly", "deleted"))
        .and(query_param_is_missing("marker"))
        .and(header("x-ms-version", API_VERSION))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(
            &[("dir", Some("1")), ("dir/a.txt", Some("2"))],
            Some("page2"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(query_param("marker", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(
            &[("dir/b.txt", Some("3")), ("orphan", None)],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let paths: Vec<_> = client.deleted_paths().try_collect().await.expect("listing");
    let names: Vec<_> = paths.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["dir", "dir/a.txt", "dir/b.txt"]);
    assert_eq!(paths[2].deletion_id, "3");
}

#[tokio::test]
async fn listing_rejection_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ms-error-code", "AuthenticationFailed")
                .set_body_string(
                    "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>AuthenticationFailed</Code><Message>Server failed to authenticate the request.</Message></Error>",
                ),
        )
        .mount(&server)
        .await;

    match collect_items(&client(&server)).await {
        Err(RestoreError::Listing(err)) => {
            assert_eq!(err.status, Some(403));
            assert_eq!(err.code.as_deref(), Some("AuthenticationFailed"));
            assert!(err.message.contains("Server failed to authenticate"));
        }
        other => panic!("expected listing error, got {other:?}"),
    }
}

#[tokio::test]
async fn undelete_sends_source_with_deletion_id() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/data/dir/a.txt"))
        .and(query_param("comp", "undelete"))
        .and(header("x-ms-undelete-source", "dir/a.txt?deletionid=42"))
        .and(header_exists("x-ms-client-request-id"))
        .and(header_exists("x-ms-date"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .undelete("dir/a.txt", "42")
        .await
        .expect("restored");
}

#[tokio::test]
async fn undelete_errors_carry_structured_signal() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/data/busy"))
        .respond_with(ResponseTemplate::new(503).insert_header("x-ms-error-code", "ServerBusy"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/data/exists"))
        .respond_with(
            ResponseTemplate::new(409).insert_header("x-ms-error-code", "PathAlreadyExists"),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let classifier = ErrorClassifier::default();

    let busy = client.undelete("busy", "1").await.expect_err("busy");
    assert_eq!(busy.message, "503 Service Unavailable");
    assert_eq!(classifier.classify(&busy), FailureKind::Server);

    let exists = client.undelete("exists", "1").await.expect_err("exists");
    assert_eq!(classifier.classify(&exists), FailureKind::Conflict);
}
