//! hubscaled.toml configuration.
//!
//! Every key is optional; a missing file section falls back to defaults.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:4370"
//!
//! [storage]
//! request_timeout_secs = 30
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the gRPC server binds to.
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 4370)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Upper bound on a single storage REST call.
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

impl StorageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        if config.storage.request_timeout_secs == 0 {
            anyhow::bail!("{}: storage.request_timeout_secs must be at least 1", path.display());
        }
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Build the HTTP client used for every storage request.
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(self.storage.request_timeout())
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:4370".parse().unwrap());
        assert_eq!(config.storage.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_full() {
        let file = write_config(
            r#"
[server]
listen = "127.0.0.1:9090"

[storage]
request_timeout_secs = 5
"#,
        );
        let config = DaemonConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(config.storage.request_timeout_secs, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config("[storage]\nrequest_timeout_secs = 12\n");
        let config = DaemonConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.storage.request_timeout_secs, 12);
    }

    #[test]
    fn test_rejects_unknown_keys_and_zero_timeout() {
        let file = write_config("[server]\nport = 4370\n");
        assert!(DaemonConfig::from_file(file.path()).is_err());

        let file = write_config("[storage]\nrequest_timeout_secs = 0\n");
        assert!(DaemonConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DaemonConfig::from_file(&dir.path().join("absent.toml")).is_err());
    }
}
