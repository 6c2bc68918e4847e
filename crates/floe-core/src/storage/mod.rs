//! Storage abstraction over object stores.
//!
//! Provides a unified interface for working with S3 and the local
//! filesystem. A provider is rooted at a lake location (bucket or
//! directory, plus an optional base prefix) and hands out keys relative
//! to that root, in a stable sorted order.

mod local;
mod s3;
mod url_parser;

pub use local::LocalConfig;
pub use s3::S3Config;
pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ListSnafu, ObjectStoreSnafu, StorageError};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over the supported storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
    pub(crate) storage_options: HashMap<String, String>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL.
    pub async fn for_url(url: &str) -> Result<Self, StorageError> {
        Self::for_url_with_options(url, HashMap::new()).await
    }

    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// List all keys under a prefix, relative to the provider root.
    ///
    /// Keys are returned sorted so reconciliation over two listings is
    /// reproducible. A missing prefix yields an empty listing rather than
    /// an error.
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let full_prefix: Path = match self.config.key() {
            Some(key) => key.parts().chain(Path::from(prefix).parts()).collect(),
            None => Path::from(prefix),
        };

        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        let mut keys = Vec::new();
        let mut stream = self.object_store.list(Some(&full_prefix));

        while let Some(result) = stream.next().await {
            match result {
                Ok(meta) => {
                    // Strip the base prefix so callers get relative keys
                    let relative: Path = meta.location.parts().skip(key_part_count).collect();
                    keys.push(relative.to_string());
                }
                Err(object_store::Error::NotFound { .. }) => {}
                Err(source) => {
                    return Err(source).context(ListSnafu {
                        prefix: prefix.to_string(),
                    });
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Get the contents of a key.
    pub async fn get(&self, path: &str) -> Result<Bytes, StorageError> {
        let qualified = self.qualify_path(Path::from(path));
        let result = self
            .object_store
            .get(&qualified)
            .await
            .context(ObjectStoreSnafu { path })?;
        result.bytes().await.context(ObjectStoreSnafu { path })
    }

    /// Check whether a key exists.
    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let qualified = self.qualify_path(Path::from(path));
        match self.object_store.head(&qualified).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore {
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Put bytes at a key.
    pub async fn put(&self, path: &str, bytes: Bytes) -> Result<(), StorageError> {
        let qualified = self.qualify_path(Path::from(path));
        self.object_store
            .put(&qualified, PutPayload::from(bytes))
            .await
            .context(ObjectStoreSnafu { path })?;
        Ok(())
    }

    /// Atomically write bytes to a key using temp file + rename.
    ///
    /// The target key is never readable in a partially-written state: if
    /// the write or rename fails, the original object (if any) is unchanged.
    pub async fn atomic_put(&self, path: &str, bytes: Bytes) -> Result<(), StorageError> {
        let temp = format!("{path}.tmp");
        self.put(&temp, bytes).await?;
        self.rename(&temp, path).await
    }

    /// Server-side rename (move) operation.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let from_qualified = self.qualify_path(Path::from(from));
        let to_qualified = self.qualify_path(Path::from(to));
        self.object_store
            .rename(&from_qualified, &to_qualified)
            .await
            .context(ObjectStoreSnafu { path: to })?;
        Ok(())
    }

    /// Canonical URL of the provider root, for logging and COPY statements.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Get storage options for external integrations.
    pub fn storage_options(&self) -> &HashMap<String, String> {
        &self.storage_options
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    fn qualify_path(&self, path: Path) -> Path {
        match self.config.key() {
            Some(prefix) => prefix.parts().chain(path.parts()).collect(),
            None => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_storage(temp_dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url(temp_dir.path().to_str().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_prefix_returns_sorted_relative_keys() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("sales/orders/2024-01-02");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("b.parquet"), b"b").unwrap();
        std::fs::write(nested.join("a.parquet"), b"a").unwrap();

        let storage = create_test_storage(&temp_dir).await;
        let keys = storage.list_prefix("sales/orders/").await.unwrap();

        assert_eq!(
            keys,
            vec![
                "sales/orders/2024-01-02/a.parquet".to_string(),
                "sales/orders/2024-01-02/b.parquet".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_prefix_missing_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = create_test_storage(&temp_dir).await;

        let keys = storage.list_prefix("no/such/prefix/").await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_exists() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("present"), b"x").unwrap();

        let storage = create_test_storage(&temp_dir).await;

        assert!(storage.exists("present").await.unwrap());
        assert!(!storage.exists("absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_atomic_put_overwrites_without_temp_residue() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("data.parquet"), b"old").unwrap();

        let storage = create_test_storage(&temp_dir).await;
        storage
            .atomic_put("data.parquet", Bytes::from_static(b"new"))
            .await
            .unwrap();

        let content = storage.get("data.parquet").await.unwrap();
        assert_eq!(content.as_ref(), b"new");
        assert!(!temp_dir.path().join("data.parquet.tmp").exists());
    }
}
