//! Backend selection for the object store.
//!
//! Configuration is an explicit value handed to [`create_object_store`],
//! never process-global state. Invalid or incomplete combinations fail
//! construction instead of deferring the error to first use.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};
use crate::storage::local::LocalDiskObjectStore;
use crate::storage::memory::MemoryObjectStore;
use crate::storage::traits::ObjectStore;

/// Recognized storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProvider {
    /// In-memory store for tests and staging.
    Memory,
    /// Local disk under a root directory.
    Local,
    /// S3-compatible remote store.
    Aws,
    /// Azure blob storage.
    Azure,
}

impl StorageProvider {
    /// Get the name of this provider.
    pub fn name(&self) -> &'static str {
        match self {
            StorageProvider::Memory => "memory",
            StorageProvider::Local => "local",
            StorageProvider::Aws => "aws",
            StorageProvider::Azure => "azure",
        }
    }
}

/// Configuration for constructing an object store client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Which backend to construct.
    pub provider: StorageProvider,
    /// Bucket/container name the node writes into.
    pub bucket: String,
    /// Service address for remote providers.
    #[serde(default)]
    pub address: String,
    /// Static access key, used when identity-based auth is off.
    #[serde(default)]
    pub access_key: String,
    /// Static secret key, used when identity-based auth is off.
    #[serde(default)]
    pub secret_key: String,
    /// Authenticate through ambient identity (IAM role, workload identity)
    /// instead of a static key pair.
    #[serde(default)]
    pub use_iam: bool,
    /// Root directory for the local provider.
    #[serde(default)]
    pub root_path: Option<PathBuf>,
}

impl ObjectStoreConfig {
    /// Convenience config for the in-memory backend.
    pub fn memory(bucket: impl Into<String>) -> Self {
        Self {
            provider: StorageProvider::Memory,
            bucket: bucket.into(),
            address: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            use_iam: false,
            root_path: None,
        }
    }

    /// Convenience config for the local-disk backend.
    pub fn local(bucket: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            provider: StorageProvider::Local,
            bucket: bucket.into(),
            address: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            use_iam: false,
            root_path: Some(root_path.into()),
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize this configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration against the process environment.
    pub fn validate(&self) -> Result<()> {
        self.validate_with_lookup(|key| std::env::var(key).ok())
    }

    /// Validate with an explicit environment lookup.
    pub fn validate_with_lookup<F>(&self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.bucket.is_empty() {
            return Err(QuiverError::invalid_argument(
                "object store bucket name must not be empty",
            ));
        }

        match self.provider {
            StorageProvider::Memory => Ok(()),
            StorageProvider::Local => {
                if self.root_path.is_none() {
                    return Err(QuiverError::invalid_argument(
                        "local object store requires a root path",
                    ));
                }
                Ok(())
            }
            StorageProvider::Aws | StorageProvider::Azure => {
                if self.address.is_empty() {
                    return Err(QuiverError::invalid_argument(format!(
                        "{} object store requires a service address",
                        self.provider.name()
                    )));
                }
                if self.use_iam {
                    let required: &[&str] = match self.provider {
                        StorageProvider::Aws => {
                            &["AWS_ROLE_ARN", "AWS_WEB_IDENTITY_TOKEN_FILE"]
                        }
                        _ => &["AZURE_CLIENT_ID", "AZURE_TENANT_ID"],
                    };
                    for &var in required {
                        if env(var).is_none_or(|v| v.is_empty()) {
                            return Err(QuiverError::invalid_argument(format!(
                                "identity-based auth requires ambient credential {var}"
                            )));
                        }
                    }
                } else if self.access_key.is_empty() || self.secret_key.is_empty() {
                    return Err(QuiverError::invalid_argument(
                        "static auth requires both access key and secret key",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Construct the object store a configuration selects.
///
/// Fails fast on invalid configuration. Remote providers are recognized but
/// their clients are not part of this crate.
pub fn create_object_store(config: &ObjectStoreConfig) -> Result<Arc<dyn ObjectStore>> {
    config.validate()?;

    match config.provider {
        StorageProvider::Memory => Ok(Arc::new(MemoryObjectStore::new())),
        StorageProvider::Local => {
            // validate() guarantees the root path is present.
            let root = config.root_path.clone().ok_or_else(|| {
                QuiverError::invalid_argument("local object store requires a root path")
            })?;
            Ok(Arc::new(LocalDiskObjectStore::new(root)?))
        }
        StorageProvider::Aws | StorageProvider::Azure => {
            Err(QuiverError::not_implemented(format!(
                "{} object store backend is not built into this crate",
                config.provider.name()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let config = ObjectStoreConfig::memory("");
        match config.validate_with_lookup(no_env) {
            Err(QuiverError::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {other:?}"),
        }
    }

    #[test]
    fn test_local_requires_root_path() {
        let mut config = ObjectStoreConfig::local("bucket", "/tmp/objects");
        assert!(config.validate_with_lookup(no_env).is_ok());

        config.root_path = None;
        assert!(config.validate_with_lookup(no_env).is_err());
    }

    #[test]
    fn test_remote_static_auth_requires_key_pair() {
        let mut config = ObjectStoreConfig {
            provider: StorageProvider::Aws,
            bucket: "bucket".to_string(),
            address: "s3.example.com:9000".to_string(),
            access_key: "ak".to_string(),
            secret_key: String::new(),
            use_iam: false,
            root_path: None,
        };
        assert!(config.validate_with_lookup(no_env).is_err());

        config.secret_key = "sk".to_string();
        assert!(config.validate_with_lookup(no_env).is_ok());
    }

    #[test]
    fn test_identity_auth_requires_ambient_credentials() {
        let config = ObjectStoreConfig {
            provider: StorageProvider::Aws,
            bucket: "bucket".to_string(),
            address: "s3.example.com:9000".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            use_iam: true,
            root_path: None,
        };
        assert!(config.validate_with_lookup(no_env).is_err());

        let with_env = |key: &str| match key {
            "AWS_ROLE_ARN" => Some("arn:aws:iam::1:role/node".to_string()),
            "AWS_WEB_IDENTITY_TOKEN_FILE" => Some("/var/run/token".to_string()),
            _ => None,
        };
        assert!(config.validate_with_lookup(with_env).is_ok());
    }

    #[test]
    fn test_remote_requires_address() {
        let config = ObjectStoreConfig {
            provider: StorageProvider::Azure,
            bucket: "bucket".to_string(),
            address: String::new(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            use_iam: false,
            root_path: None,
        };
        assert!(config.validate_with_lookup(no_env).is_err());
    }

    #[test]
    fn test_create_memory_store() {
        let store = create_object_store(&ObjectStoreConfig::memory("bucket")).unwrap();
        store.put("bucket", "k", b"x").unwrap();
        assert_eq!(store.get("bucket", "k").unwrap(), b"x");
    }

    #[test]
    fn test_create_remote_store_not_implemented() {
        let config = ObjectStoreConfig {
            provider: StorageProvider::Aws,
            bucket: "bucket".to_string(),
            address: "s3.example.com:9000".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            use_iam: false,
            root_path: None,
        };
        match create_object_store(&config) {
            Err(QuiverError::NotImplemented(_)) => {}
            other => panic!("expected not implemented, got {other:?}"),
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ObjectStoreConfig::local("bucket", "/var/lib/quiver");
        let json = config.to_json().unwrap();
        let parsed = ObjectStoreConfig::from_json(&json).unwrap();

        assert_eq!(parsed.provider, StorageProvider::Local);
        assert_eq!(parsed.bucket, "bucket");
        assert_eq!(parsed.root_path, Some(PathBuf::from("/var/lib/quiver")));
    }
}
