use std::{
    io,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use herald_common::internal;
use tokio::{fs, sync::Mutex};

use crate::{
    SerializationError, StoreError, ValidationError,
    config::validate_path,
    r#trait::{BackingStore, Filter, Modify, Mutation, Record},
    types::RecordId,
};

const TEMP_PREFIX: &str = ".tmp_";

/// File-based backing store implementation
///
/// Each record is one file, `{ulid}.bin`, holding the bincode encoding of the
/// record. The ULID filename means a directory listing sorted by name is a
/// listing sorted by age.
///
/// # Atomicity
/// Every write goes to `.tmp_{ulid}.bin` first and is then renamed into
/// place, so a crash never leaves a half-written record behind. Leftover
/// temporary files are ignored by every read and removed by [`Self::init`].
///
/// Mutations are serialised through a single writer lock; reads never take it.
#[derive(Debug, Clone)]
pub struct FileBackingStore<T: Record> {
    path: PathBuf,
    writer: Arc<Mutex<()>>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> FileBackingStore<T> {
    /// Create a store rooted at `path`
    ///
    /// # Errors
    /// If the path fails validation. The directory is not touched until
    /// [`Self::init`] is called.
    pub fn new(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        validate_path(&path)?;

        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(())),
            _record: PhantomData,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Initialise the store directory
    ///
    /// Creates the directory if it does not exist, checks that it is a
    /// directory, and removes any temporary files left by a crash.
    ///
    /// # Errors
    /// - If the directory cannot be created
    /// - If the path exists but is not a directory
    pub fn init(&self) -> crate::Result<()> {
        internal!("Initialising store at {} ...", self.path.display());

        if !self.path.try_exists()? {
            internal!("{:?} does not exist, creating...", self.path);
            std::fs::create_dir_all(&self.path)?;
        } else if !self.path.is_dir() {
            return Err(ValidationError::NotDirectory(self.path.display().to_string()).into());
        }

        let mut cleaned = 0;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned temporary files from {}",
                self.path.display()
            );
        }

        Ok(())
    }

    fn record_path(&self, id: &RecordId) -> PathBuf {
        self.path.join(id.filename())
    }

    /// Ids of every committed record, oldest first
    async fn ids(&self) -> crate::Result<Vec<RecordId>> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            if !filename.starts_with(TEMP_PREFIX)
                && let Some(id) = RecordId::from_filename(&filename)
            {
                ids.push(id);
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    async fn load(&self, id: &RecordId) -> crate::Result<T> {
        let bytes = fs::read(self.record_path(id))
            .await
            .map_err(|err| not_found_or_io(*id, err))?;

        let (record, _): (T, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;

        if record.id() != id {
            return Err(SerializationError::Corrupted(format!(
                "{} holds record {}",
                id.filename(),
                record.id()
            ))
            .into());
        }

        Ok(record)
    }

    /// Write the record to a temporary file and rename it into place.
    /// Callers must hold the writer lock.
    async fn store(&self, record: &T) -> crate::Result<()> {
        let id = record.id();
        let encoded = bincode::serde::encode_to_vec(record, bincode::config::standard())?;

        let temp_path = self.path.join(format!("{TEMP_PREFIX}{}", id.filename()));
        fs::write(&temp_path, &encoded).await?;
        fs::rename(&temp_path, self.record_path(id)).await?;

        Ok(())
    }

    async fn ensure_vacant(&self, id: &RecordId) -> crate::Result<()> {
        if fs::try_exists(self.record_path(id)).await? {
            return Err(StoreError::AlreadyExists(*id));
        }
        Ok(())
    }
}

fn not_found_or_io(id: RecordId, err: io::Error) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(id)
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl<T: Record> BackingStore<T> for FileBackingStore<T> {
    #[tracing::instrument(level = "debug", skip_all, fields(id = %record.id()))]
    async fn insert(&self, record: &T) -> crate::Result<()> {
        let _writer = self.writer.lock().await;

        self.ensure_vacant(record.id()).await?;
        self.store(record).await?;

        internal!(level = DEBUG, "Stored record {}", record.id());
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(count = records.len()))]
    async fn insert_many(&self, records: &[T]) -> crate::Result<()> {
        let _writer = self.writer.lock().await;

        for record in records {
            self.ensure_vacant(record.id()).await?;
        }
        for record in records {
            self.store(record).await?;
        }

        internal!(level = DEBUG, "Stored {} records", records.len());
        Ok(())
    }

    async fn read(&self, id: &RecordId) -> crate::Result<T> {
        self.load(id).await
    }

    #[tracing::instrument(level = "debug", skip(self, mutation), fields(id = %id))]
    async fn modify(&self, id: &RecordId, mutation: Mutation<'_, T>) -> crate::Result<Modify<T>> {
        let _writer = self.writer.lock().await;

        let current = self.load(id).await?;
        let mut candidate = current.clone();

        if mutation(&mut candidate) {
            self.store(&candidate).await?;
            Ok(Modify::Applied(candidate))
        } else {
            Ok(Modify::Unchanged(current))
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn scan(&self, filter: Filter<'_, T>, limit: Option<usize>) -> crate::Result<Vec<T>> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut matched = Vec::new();

        for id in self.ids().await? {
            if matched.len() >= limit {
                break;
            }

            match self.load(&id).await {
                Ok(record) if filter(&record) => matched.push(record),
                Ok(_) | Err(StoreError::NotFound(_)) => {}
                Err(StoreError::Serialization(err)) => {
                    internal!(level = WARN, "Skipping unreadable record {id}: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(matched)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(id = %id))]
    async fn delete(&self, id: &RecordId) -> crate::Result<()> {
        let _writer = self.writer.lock().await;

        fs::remove_file(self.record_path(id))
            .await
            .map_err(|err| not_found_or_io(*id, err))?;

        internal!(level = DEBUG, "Deleted record {id}");
        Ok(())
    }

    async fn count(&self) -> crate::Result<usize> {
        Ok(self.ids().await?.len())
    }
}
