//! Storage abstraction for JSON persistence
//!
//! Files live in a `.storage/` directory under the data directory, each one
//! wrapped in a versioned envelope.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported storage version for {key}: expected {expected}, found {found}")]
    VersionMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage file wrapper with version tracking
///
/// JSON format:
/// ```json
/// {
///   "version": 1,
///   "minor_version": 1,
///   "key": "immich_album_watcher.<entry_id>",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version - breaking changes
    pub version: u32,
    /// Minor version - additive changes within a major version
    pub minor_version: u32,
    /// Storage key (file identifier)
    pub key: String,
    /// The actual data
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Types persisted through [`Storage`] under a caller-chosen key
pub trait Storable: Serialize + DeserializeOwned {
    /// Current major version
    const VERSION: u32;
    /// Current minor version
    const MINOR_VERSION: u32;
}

/// Storage manager for the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// Create a storage manager rooted at `<data_dir>/.storage`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: data_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Ensure the storage directory exists
    pub async fn ensure_dir(&self) -> StorageResult<()> {
        if !self.storage_dir.exists() {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!("Created storage directory: {:?}", self.storage_dir);
        }
        Ok(())
    }

    /// Get the file path for a storage key
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }

    /// Load a storage file
    ///
    /// Returns None if the file doesn't exist.
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.file_path(key);

        if !path.exists() {
            debug!("Storage file not found: {}", key);
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let storage_file: StorageFile<T> = serde_json::from_str(&content)?;

        debug!(
            "Loaded storage file: {} (v{}.{})",
            key, storage_file.version, storage_file.minor_version
        );

        Ok(Some(storage_file))
    }

    /// Load the data stored under `key`, checking its version
    pub async fn load_data<T: Storable>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(file) = self.load::<T>(key).await? else {
            return Ok(None);
        };

        if file.version != T::VERSION {
            return Err(StorageError::VersionMismatch {
                key: key.to_string(),
                expected: T::VERSION,
                found: file.version,
            });
        }
        if file.minor_version < T::MINOR_VERSION {
            warn!(
                "Storage {} has older minor version ({} < {})",
                key,
                file.minor_version,
                T::MINOR_VERSION
            );
        }

        Ok(Some(file.data))
    }

    /// Save a storage file
    ///
    /// Writes atomically by first writing to a temp file, then renaming.
    pub async fn save<T>(&self, storage_file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        self.ensure_dir().await?;

        let path = self.file_path(&storage_file.key);
        let temp_path = self.file_path(&format!("{}.tmp", storage_file.key));

        let content = serde_json::to_string_pretty(storage_file)?;
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(
            "Saved storage file: {} (v{}.{})",
            storage_file.key, storage_file.version, storage_file.minor_version
        );

        Ok(())
    }

    /// Save `data` under `key` at its current version
    pub async fn save_data<T: Storable>(&self, key: &str, data: &T) -> StorageResult<()> {
        self.save(&StorageFile::new(key, data, T::VERSION, T::MINOR_VERSION))
            .await
    }

    /// Delete a storage file
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.file_path(key);

        if path.exists() {
            fs::remove_file(&path).await?;
            debug!("Deleted storage file: {}", key);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    impl Storable for TestData {
        const VERSION: u32 = 1;
        const MINOR_VERSION: u32 = 1;
    }

    #[tokio::test]
    async fn test_storage_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };
        storage.save_data("test.data", &data).await.unwrap();

        assert!(storage.exists("test.data").await);
        assert!(temp_dir.path().join(".storage/test.data").exists());
        assert!(!temp_dir.path().join(".storage/test.data.tmp").exists());

        let loaded: Option<TestData> = storage.load_data("test.data").await.unwrap();
        assert_eq!(loaded, Some(data));

        let raw: StorageFile<serde_json::Value> =
            storage.load("test.data").await.unwrap().unwrap();
        assert_eq!(raw.key, "test.data");
        assert_eq!(raw.version, 1);
    }

    #[tokio::test]
    async fn test_storage_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let result: Option<TestData> = storage.load_data("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let file = StorageFile::new(
            "test.data",
            TestData {
                name: "old".into(),
                value: 1,
            },
            7,
            1,
        );
        storage.save(&file).await.unwrap();

        let err = storage.load_data::<TestData>("test.data").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionMismatch {
                expected: 1,
                found: 7,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_storage_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };
        storage.save_data("test.data", &data).await.unwrap();
        storage.delete("test.data").await.unwrap();
        assert!(!storage.exists("test.data").await);

        // Deleting twice is fine
        storage.delete("test.data").await.unwrap();
    }
}
