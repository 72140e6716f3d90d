use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;

use crate::{
    ValidationError,
    backends::{FileBackingStore, MemoryBackingStore},
    r#trait::{BackingStore, Record},
};

/// Configuration for the record store
///
/// Each collection (deliveries, notifications) gets its own subdirectory of
/// a file store, or its own map in a memory store.
///
/// # Examples
///
/// File-backed store in RON config:
/// ```ron
/// Herald (
///     store: (
///         type: "File",
///         path: "/var/lib/herald",
///     ),
/// )
/// ```
///
/// Memory-backed store with a capacity limit per collection:
/// ```ron
/// Herald (
///     store: (
///         type: "Memory",
///         capacity: 1000,
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// One file per record (production)
    File(FileConfig),
    /// Records held in memory (testing/development)
    Memory(MemoryConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File(FileConfig::default())
    }
}

/// Configuration for the file-backed store
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub path: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/herald"),
        }
    }
}

impl<'de> Deserialize<'de> for FileConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileConfigHelper {
            path: PathBuf,
        }

        let helper = FileConfigHelper::deserialize(deserializer)?;
        validate_path(&helper.path).map_err(serde::de::Error::custom)?;

        Ok(Self { path: helper.path })
    }
}

/// Configuration for the memory-backed store
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemoryConfig {
    /// Maximum number of records per collection (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl StoreConfig {
    /// The root directory for file-backed stores
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(config) => Some(&config.path),
            Self::Memory(_) => None,
        }
    }

    /// Open (and for file stores, initialise) the named collection
    ///
    /// # Errors
    /// - If the collection name is not a plain identifier
    /// - If the collection directory cannot be created
    pub fn open<T: Record>(&self, collection: &str) -> crate::Result<Arc<dyn BackingStore<T>>> {
        validate_collection(collection)?;

        match self {
            Self::File(config) => {
                let store = FileBackingStore::new(config.path.join(collection))?;
                store.init()?;
                Ok(Arc::new(store))
            }
            Self::Memory(config) => Ok(config.capacity.map_or_else(
                || Arc::new(MemoryBackingStore::new()) as Arc<dyn BackingStore<T>>,
                |capacity| Arc::new(MemoryBackingStore::with_capacity(capacity)),
            )),
        }
    }
}

fn validate_collection(collection: &str) -> Result<(), ValidationError> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidCollection(collection.to_string()))
    }
}

/// Validate a store path
///
/// Rejects `..` components, relative paths, and paths inside system
/// directories.
pub(crate) fn validate_path(path: &Path) -> Result<(), ValidationError> {
    if path
        .components()
        .any(|component| component == std::path::Component::ParentDir)
    {
        return Err(ValidationError::ParentDirectory(path.display().to_string()));
    }

    if !path.is_absolute() {
        return Err(ValidationError::NotAbsolute(path.display().to_string()));
    }

    let sensitive_prefixes = [
        "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
    ];

    if let Some(prefix) = sensitive_prefixes
        .iter()
        .find(|prefix| path.starts_with(prefix))
    {
        return Err(ValidationError::SystemDirectory {
            prefix: (*prefix).to_string(),
            path: path.display().to_string(),
        });
    }

    Ok(())
}
