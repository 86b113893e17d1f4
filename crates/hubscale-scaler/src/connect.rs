//! Resolving trigger metadata into a storage client.

use std::sync::Arc;

use tracing::debug;

use hubscale_storage::{AzureStorageClient, InMemoryStorage, TaskHubStorage};

use crate::error::ScalerError;
use crate::metadata::ConnectionSource;

/// Opens the storage account a scaled object points at.
///
/// Called once per RPC, since the connection may differ between scaled
/// objects served by the same process.
pub trait StorageFactory: Send + Sync + 'static {
    fn connect(&self, source: &ConnectionSource) -> Result<Arc<dyn TaskHubStorage>, ScalerError>;
}

/// Connects to Azure Storage with a SAS connection string.
///
/// All clients share one `reqwest` connection pool.
#[derive(Debug, Clone, Default)]
pub struct AzureStorageFactory {
    http: reqwest::Client,
}

impl AzureStorageFactory {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl StorageFactory for AzureStorageFactory {
    fn connect(&self, source: &ConnectionSource) -> Result<Arc<dyn TaskHubStorage>, ScalerError> {
        let connection_string = match source {
            ConnectionSource::Literal(value) => value.clone(),
            ConnectionSource::FromEnv(name) => std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ScalerError::MissingConnection(name.clone()))?,
        };

        let client = AzureStorageClient::from_connection_string(self.http.clone(), &connection_string)?;
        debug!(blob = client.settings().blob_endpoint(), "connected to storage account");
        Ok(Arc::new(client))
    }
}

/// Every scaled object sees the same in-process store.
impl StorageFactory for InMemoryStorage {
    fn connect(&self, _source: &ConnectionSource) -> Result<Arc<dyn TaskHubStorage>, ScalerError> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubscale_storage::ConnectionStringError;

    #[test]
    fn literal_sas_connection_string() {
        let factory = AzureStorageFactory::default();
        let source = ConnectionSource::Literal(
            "AccountName=acct;SharedAccessSignature=sv=2019-02-02&sig=abc".to_string(),
        );
        assert!(factory.connect(&source).is_ok());
    }

    #[test]
    fn unset_variable_is_missing_connection() {
        let factory = AzureStorageFactory::default();
        let source = ConnectionSource::FromEnv("HUBSCALE_TEST_UNSET_CONNECTION_VAR".to_string());
        match factory.connect(&source) {
            Err(ScalerError::MissingConnection(name)) => {
                assert_eq!(name, "HUBSCALE_TEST_UNSET_CONNECTION_VAR")
            }
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn account_key_is_rejected() {
        let factory = AzureStorageFactory::default();
        let source = ConnectionSource::Literal(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5".to_string(),
        );
        assert!(matches!(
            factory.connect(&source),
            Err(ScalerError::Connection(ConnectionStringError::UnsupportedCredential(_)))
        ));
    }
}
