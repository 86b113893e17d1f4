//! Azure Storage REST client.
//!
//! Issues the three reads the scaler needs directly against the blob,
//! queue, and table service endpoints, authenticating with a shared
//! access signature appended to every request URL.
//!
//! ```text
//! download_blob              GET {blob}/{container}/{blob}?{sas}
//! approximate_message_count  GET {queue}/{queue}?{sas}&comp=metadata
//! query_table_row_keys       GET {table}/{table}()?{sas}&$select=RowKey[&NextPartitionKey=..&NextRowKey=..]
//! ```
//!
//! A 404 from any service maps to `StorageError::NotFound`. Any other
//! non-success status is returned as `StorageError::Status` with the
//! service's `x-ms-error-code` and response body attached.

mod connection;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::TaskHubStorage;
use crate::error::{ConnectionStringError, ResourceKind, StorageError, StorageResult};

pub use connection::ConnectionSettings;

/// REST API version sent with every request. Supported by all three services.
const API_VERSION: &str = "2019-02-02";

const APPROXIMATE_COUNT_HEADER: &str = "x-ms-approximate-messages-count";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";
const NEXT_PARTITION_KEY_HEADER: &str = "x-ms-continuation-nextpartitionkey";
const NEXT_ROW_KEY_HEADER: &str = "x-ms-continuation-nextrowkey";

/// One page of a table query projected to `RowKey`.
#[derive(Debug, Deserialize)]
struct TablePage {
    value: Vec<RowKeyEntity>,
}

#[derive(Debug, Deserialize)]
struct RowKeyEntity {
    #[serde(rename = "RowKey")]
    row_key: String,
}

/// Continuation token returned by the table service between pages.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Continuation {
    next_partition_key: String,
    next_row_key: Option<String>,
}

/// Storage client for one account.
///
/// Cheap to clone: the underlying `reqwest::Client` shares its connection
/// pool across clones.
#[derive(Debug, Clone)]
pub struct AzureStorageClient {
    http: reqwest::Client,
    settings: ConnectionSettings,
}

impl AzureStorageClient {
    pub fn new(http: reqwest::Client, settings: ConnectionSettings) -> Self {
        Self { http, settings }
    }

    /// Parse a connection string and build a client around `http`.
    pub fn from_connection_string(
        http: reqwest::Client,
        connection_string: &str,
    ) -> Result<Self, ConnectionStringError> {
        Ok(Self::new(http, connection_string.parse()?))
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn resource_url(&self, endpoint: &str, path: &str) -> StorageResult<Url> {
        let mut url = Url::parse(&format!("{endpoint}/{path}"))
            .map_err(|e| StorageError::Malformed(format!("invalid resource url for {path}: {e}")))?;
        url.set_query(Some(self.settings.sas()));
        Ok(url)
    }

    async fn get(&self, url: Url, table: bool) -> StorageResult<Response> {
        let mut request = self.http.get(url).header("x-ms-version", API_VERSION);
        if table {
            request = request
                .header("Accept", "application/json;odata=nometadata")
                .header("DataServiceVersion", "3.0")
                .header("MaxDataServiceVersion", "3.0;NetFx");
        }
        Ok(request.send().await?)
    }

    async fn query_table_page(
        &self,
        table: &str,
        continuation: Option<&Continuation>,
    ) -> StorageResult<(Vec<String>, Option<Continuation>)> {
        let mut url = self.resource_url(self.settings.table_endpoint(), &format!("{table}()"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("$select", "RowKey");
            if let Some(token) = continuation {
                query.append_pair("NextPartitionKey", &token.next_partition_key);
                if let Some(row_key) = &token.next_row_key {
                    query.append_pair("NextRowKey", row_key);
                }
            }
        }

        let response = check_status(self.get(url, true).await?, ResourceKind::Table, table).await?;
        let next = continuation_from(response.headers());
        let body = response.bytes().await?;
        let page: TablePage = serde_json::from_slice(&body).map_err(|e| {
            StorageError::Malformed(format!("table {table} query body: {e}"))
        })?;

        Ok((page.value.into_iter().map(|e| e.row_key).collect(), next))
    }
}

#[async_trait]
impl TaskHubStorage for AzureStorageClient {
    async fn download_blob(&self, container: &str, blob: &str) -> StorageResult<Vec<u8>> {
        let url = self.resource_url(self.settings.blob_endpoint(), &format!("{container}/{blob}"))?;
        debug!(container, blob, "downloading blob");

        let name = format!("{container}/{blob}");
        let response = check_status(self.get(url, false).await?, ResourceKind::Blob, &name).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn query_table_row_keys(&self, table: &str) -> StorageResult<Vec<String>> {
        let mut row_keys = Vec::new();
        let mut continuation: Option<Continuation> = None;
        let mut pages = 0usize;

        loop {
            let (page, next) = self.query_table_page(table, continuation.as_ref()).await?;
            pages += 1;
            row_keys.extend(page);

            match next {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        debug!(table, pages, rows = row_keys.len(), "queried table row keys");
        Ok(row_keys)
    }

    async fn approximate_message_count(&self, queue: &str) -> StorageResult<u64> {
        let mut url = self.resource_url(self.settings.queue_endpoint(), queue)?;
        url.query_pairs_mut().append_pair("comp", "metadata");

        let response = check_status(self.get(url, false).await?, ResourceKind::Queue, queue).await?;
        let count = response
            .headers()
            .get(APPROXIMATE_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                StorageError::Malformed(format!(
                    "queue {queue} metadata is missing a valid {APPROXIMATE_COUNT_HEADER} header"
                ))
            })?;

        debug!(queue, count, "read approximate message count");
        Ok(count)
    }
}

/// Map a non-success response onto the storage error taxonomy.
async fn check_status(response: Response, kind: ResourceKind, name: &str) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StorageError::not_found(kind, name));
    }

    let code = response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let message = response.text().await.unwrap_or_default();

    Err(StorageError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

fn continuation_from(headers: &HeaderMap) -> Option<Continuation> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };

    header(NEXT_PARTITION_KEY_HEADER).map(|next_partition_key| Continuation {
        next_partition_key,
        next_row_key: header(NEXT_ROW_KEY_HEADER),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn continuation_requires_partition_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(continuation_from(&headers), None);

        headers.insert(NEXT_ROW_KEY_HEADER, HeaderValue::from_static("1!8!cm93"));
        assert_eq!(continuation_from(&headers), None);

        headers.insert(NEXT_PARTITION_KEY_HEADER, HeaderValue::from_static("1!4!cGs-"));
        assert_eq!(
            continuation_from(&headers),
            Some(Continuation {
                next_partition_key: "1!4!cGs-".to_string(),
                next_row_key: Some("1!8!cm93".to_string()),
            })
        );
    }

    #[test]
    fn resource_url_appends_sas() {
        let settings: ConnectionSettings = "AccountName=acct;SharedAccessSignature=sv=1&sig=a%2Bb"
            .parse()
            .unwrap();
        let client = AzureStorageClient::new(reqwest::Client::new(), settings);

        let url = client
            .resource_url(client.settings().blob_endpoint(), "hub-leases/taskhub.json")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://acct.blob.core.windows.net/hub-leases/taskhub.json?sv=1&sig=a%2Bb"
        );
    }
}
