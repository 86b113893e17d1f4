//! Azure client request-shape tests against a mock storage endpoint.

use hubscale_storage::{AzureStorageClient, ConnectionSettings, StorageError, TaskHubStorage};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> AzureStorageClient {
    let uri = server.uri();
    let settings = ConnectionSettings::new(&uri, &uri, &uri, "?sv=2019-02-02&sig=abc").unwrap();
    AzureStorageClient::new(reqwest::Client::new(), settings)
}

#[tokio::test]
async fn download_blob_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/myhub-leases/taskhub.json"))
        .and(query_param("sig", "abc"))
        .and(header("x-ms-version", "2019-02-02"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"PartitionCount":4}"#))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let body = client
        .download_blob("myhub-leases", "taskhub.json")
        .await
        .unwrap();
    assert_eq!(body, br#"{"PartitionCount":4}"#);
}

#[tokio::test]
async fn missing_blob_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/myhub-leases/taskhub.json"))
        .respond_with(ResponseTemplate::new(404).insert_header("x-ms-error-code", "ContainerNotFound"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .download_blob("myhub-leases", "taskhub.json")
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
async fn forbidden_keeps_status_and_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/myhub-control-00"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ms-error-code", "AuthorizationFailure")
                .set_body_string("denied"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .approximate_message_count("myhub-control-00")
        .await
        .unwrap_err();
    match err {
        StorageError::Status {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 403);
            assert_eq!(code.as_deref(), Some("AuthorizationFailure"));
            assert_eq!(message, "denied");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn queue_count_comes_from_metadata_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/myhub-workitems"))
        .and(query_param("comp", "metadata"))
        .and(query_param("sv", "2019-02-02"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-ms-approximate-messages-count", "42"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert_eq!(client.approximate_message_count("myhub-workitems").await.unwrap(), 42);
}

#[tokio::test]
async fn queue_without_count_header_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/myhub-workitems"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .approximate_message_count("myhub-workitems")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Malformed(_)));
}

#[tokio::test]
async fn table_query_follows_continuation_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/MyHubPartitions()"))
        .and(query_param("NextPartitionKey", "1!4!cGs-"))
        .and(query_param("NextRowKey", "1!8!cm93"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"value":[{"RowKey":"myhub-control-02"}]}"#),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/MyHubPartitions()"))
        .and(query_param("$select", "RowKey"))
        .and(header("accept", "application/json;odata=nometadata"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ms-continuation-NextPartitionKey", "1!4!cGs-")
                .insert_header("x-ms-continuation-NextRowKey", "1!8!cm93")
                .set_body_string(
                    r#"{"value":[{"RowKey":"myhub-control-00"},{"RowKey":"myhub-control-01"}]}"#,
                ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let keys = client.query_table_row_keys("MyHubPartitions").await.unwrap();
    assert_eq!(
        keys,
        vec!["myhub-control-00", "myhub-control-01", "myhub-control-02"]
    );
}

#[tokio::test]
async fn missing_table_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/MyHubPartitions()"))
        .respond_with(ResponseTemplate::new(404).insert_header("x-ms-error-code", "TableNotFound"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.query_table_row_keys("MyHubPartitions").await.unwrap_err();
    assert!(err.is_not_found());
}
