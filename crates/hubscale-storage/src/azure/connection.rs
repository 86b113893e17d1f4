//! Storage connection string parsing.
//!
//! Accepts the standard `Key=Value;Key=Value` format. Endpoints are taken
//! verbatim when given (`BlobEndpoint=...`) or derived from `AccountName`
//! and `EndpointSuffix`. Only shared access signatures are supported as
//! credentials; account keys and development storage need request signing,
//! which this client does not implement.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use reqwest::Url;

use crate::error::ConnectionStringError;

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const DEFAULT_PROTOCOL: &str = "https";

/// Resolved service endpoints and credential for one storage account.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    blob_endpoint: String,
    queue_endpoint: String,
    table_endpoint: String,
    sas: String,
}

impl ConnectionSettings {
    /// Build settings from explicit endpoints and a SAS token.
    pub fn new(
        blob_endpoint: &str,
        queue_endpoint: &str,
        table_endpoint: &str,
        sas: &str,
    ) -> Result<Self, ConnectionStringError> {
        let sas = sas.trim().trim_start_matches('?');
        if sas.is_empty() {
            return Err(ConnectionStringError::UnsupportedCredential(
                "SharedAccessSignature is empty".to_string(),
            ));
        }
        Ok(Self {
            blob_endpoint: normalize_endpoint("blob", blob_endpoint)?,
            queue_endpoint: normalize_endpoint("queue", queue_endpoint)?,
            table_endpoint: normalize_endpoint("table", table_endpoint)?,
            sas: sas.to_string(),
        })
    }

    pub fn blob_endpoint(&self) -> &str {
        &self.blob_endpoint
    }

    pub fn queue_endpoint(&self) -> &str {
        &self.queue_endpoint
    }

    pub fn table_endpoint(&self) -> &str {
        &self.table_endpoint
    }

    /// SAS query string, without the leading `?`.
    pub fn sas(&self) -> &str {
        &self.sas
    }
}

// The SAS token is a bearer credential; keep it out of logs.
impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("blob_endpoint", &self.blob_endpoint)
            .field("queue_endpoint", &self.queue_endpoint)
            .field("table_endpoint", &self.table_endpoint)
            .field("sas", &"<redacted>")
            .finish()
    }
}

impl FromStr for ConnectionSettings {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pairs = parse_pairs(s)?;
        let get = |key: &str| pairs.get(key).map(String::as_str).filter(|v| !v.is_empty());

        if get("usedevelopmentstorage").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            return Err(ConnectionStringError::UnsupportedCredential(
                "development storage requires account key signing".to_string(),
            ));
        }

        let sas = match (get("sharedaccesssignature"), get("accountkey")) {
            (Some(sas), _) => sas,
            (None, Some(_)) => {
                return Err(ConnectionStringError::UnsupportedCredential(
                    "AccountKey connection strings are not supported; the connection \
                     (AzureWebJobsStorage by default) must carry a SharedAccessSignature"
                        .to_string(),
                ));
            }
            (None, None) => {
                return Err(ConnectionStringError::UnsupportedCredential(
                    "connection string has no SharedAccessSignature".to_string(),
                ));
            }
        };

        let protocol = get("defaultendpointsprotocol").unwrap_or(DEFAULT_PROTOCOL);
        let suffix = get("endpointsuffix").unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
        let account = get("accountname");

        let endpoint = |service: &'static str| -> Result<String, ConnectionStringError> {
            let key = format!("{service}endpoint");
            match (get(key.as_str()), account) {
                (Some(explicit), _) => Ok(explicit.to_string()),
                (None, Some(account)) => Ok(format!("{protocol}://{account}.{service}.{suffix}")),
                (None, None) => Err(ConnectionStringError::MissingEndpoint { service }),
            }
        };

        Self::new(
            &endpoint("blob")?,
            &endpoint("queue")?,
            &endpoint("table")?,
            sas,
        )
    }
}

/// Split a connection string into lowercase keys and raw values.
///
/// Values may themselves contain `=` (SAS tokens do), so only the first
/// `=` of a segment separates key from value.
fn parse_pairs(s: &str) -> Result<HashMap<String, String>, ConnectionStringError> {
    if s.trim().is_empty() {
        return Err(ConnectionStringError::Empty);
    }

    let mut pairs = HashMap::new();
    for segment in s.split(';').map(str::trim).filter(|seg| !seg.is_empty()) {
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| ConnectionStringError::MalformedSegment(segment.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConnectionStringError::MalformedSegment(segment.to_string()));
        }
        pairs.insert(key.to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(pairs)
}

fn normalize_endpoint(service: &'static str, endpoint: &str) -> Result<String, ConnectionStringError> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let invalid = || ConnectionStringError::InvalidEndpoint {
        service,
        endpoint: endpoint.to_string(),
    };
    let url = Url::parse(trimmed).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.query().is_some() {
        return Err(invalid());
    }
    Ok(trimmed.to_string())
}
