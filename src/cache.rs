use std::io::{self, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::CacheError;
use crate::types::ResourceRecord;

/// Directory of `<name>.json` collection artifacts.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers see either the previous or the new artifact.
#[derive(Debug, Clone)]
pub struct CacheWriter {
    dir: PathBuf,
}

impl CacheWriter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `name`.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Replaces the `name` artifact with `records` as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// [`CacheError::WriteFailed`] if the directory, temp file or rename fails;
    /// [`CacheError::Serialize`] if a record cannot be encoded.
    pub fn write_collection(
        &self,
        name: &str,
        records: &[ResourceRecord],
    ) -> Result<PathBuf, CacheError> {
        let path = self.path_for(name);
        let write_failed = |source| CacheError::WriteFailed {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(write_failed)?;

        let prefix = format!(".{name}.");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".tmp");
        // Other processes read the cache; tempfile defaults to owner-only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o644));
        }
        let tmp = builder.tempfile_in(&self.dir).map_err(write_failed)?;

        let mut writer = BufWriter::new(tmp);
        serde_json::to_writer_pretty(&mut writer, records).map_err(|source| {
            CacheError::Serialize {
                name: name.to_owned(),
                source,
            }
        })?;
        let tmp: NamedTempFile = writer
            .into_inner()
            .map_err(|e| write_failed(e.into_error()))?;
        tmp.as_file().sync_all().map_err(write_failed)?;

        tmp.persist(&path).map_err(|e| write_failed(e.error))?;

        tracing::debug!(path = %path.display(), records = records.len(), "Cache artifact written");
        Ok(path)
    }

    /// Raw bytes of the `name` artifact, or `None` if it has never been written.
    ///
    /// # Errors
    ///
    /// [`CacheError::ReadFailed`] for I/O errors other than a missing file.
    pub fn read_collection(&self, name: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::ReadFailed { path, source }),
        }
    }

    /// [`write_collection`](Self::write_collection) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// As [`write_collection`](Self::write_collection).
    pub async fn save(
        &self,
        name: &'static str,
        records: Vec<ResourceRecord>,
    ) -> Result<PathBuf, CacheError> {
        let cache = self.clone();
        let path = self.path_for(name);
        tokio::task::spawn_blocking(move || cache.write_collection(name, &records))
            .await
            .map_err(|e| CacheError::WriteFailed {
                path,
                source: io::Error::other(e),
            })?
    }

    /// [`read_collection`](Self::read_collection) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// As [`read_collection`](Self::read_collection).
    pub async fn load(&self, name: &'static str) -> Result<Option<Vec<u8>>, CacheError> {
        let cache = self.clone();
        let path = self.path_for(name);
        tokio::task::spawn_blocking(move || cache.read_collection(name))
            .await
            .map_err(|e| CacheError::ReadFailed {
                path,
                source: io::Error::other(e),
            })?
    }
}
